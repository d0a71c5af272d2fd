use chrono::{Datelike, NaiveDate};
use serde::Deserialize;

use crate::db::cases::{CaseRecord, IGNORED};
use crate::error::ReportError;

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%d/%m/%Y"];
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

#[derive(Debug, Deserialize)]
struct RawCase {
    #[serde(rename = "DT_SIN_PRI", default)]
    onset: Option<String>,
    #[serde(rename = "EVOLUCAO", default, deserialize_with = "csv::invalid_option")]
    outcome: Option<i64>,
    #[serde(rename = "UTI", default, deserialize_with = "csv::invalid_option")]
    icu: Option<i64>,
    #[serde(rename = "VACINA_COV", default, deserialize_with = "csv::invalid_option")]
    covid_vaccine: Option<i64>,
    #[serde(rename = "VACINA", default, deserialize_with = "csv::invalid_option")]
    flu_vaccine: Option<i64>,
    #[serde(rename = "CLASSI_FIN", default, deserialize_with = "csv::invalid_option")]
    classification: Option<i64>,
    #[serde(rename = "SEM_PRI", default, deserialize_with = "csv::invalid_option")]
    epi_week: Option<i64>,
}

#[derive(Debug, Default)]
pub struct ParsedSource {
    pub records: Vec<CaseRecord>,
    pub rows_dropped: usize,
}

/// Parses one `;`-separated, Latin-1 encoded notification file.
pub fn parse_cases(bytes: &[u8]) -> Result<ParsedSource, ReportError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let text = decode_latin1(bytes);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| ReportError::Ingest(format!("unreadable header: {e}")))?;
    if !headers.iter().any(|h| h.trim() == "DT_SIN_PRI") {
        return Err(ReportError::Ingest("missing DT_SIN_PRI column".to_string()));
    }

    let mut parsed = ParsedSource::default();
    for row in reader.deserialize::<RawCase>() {
        match row.ok().and_then(normalize) {
            Some(record) => parsed.records.push(record),
            None => parsed.rows_dropped += 1,
        }
    }

    Ok(parsed)
}

fn normalize(raw: RawCase) -> Option<CaseRecord> {
    let onset_date = parse_date(raw.onset.as_deref()?)?;
    let iso = onset_date.iso_week();

    Some(CaseRecord {
        onset_date,
        year: onset_date.year(),
        month: onset_date.month(),
        year_week: format!("{}-{:02}", onset_date.year(), iso.week()),
        epi_week: raw.epi_week.unwrap_or(IGNORED),
        outcome_code: raw.outcome.unwrap_or(IGNORED),
        icu_flag: raw.icu.unwrap_or(IGNORED),
        covid_vaccine_flag: raw.covid_vaccine.unwrap_or(IGNORED),
        flu_vaccine_flag: raw.flu_vaccine.unwrap_or(IGNORED),
        classification_code: raw.classification.unwrap_or(IGNORED),
    })
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
}

fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "NU_NOTIFIC;DT_SIN_PRI;SEM_PRI;CLASSI_FIN;EVOLUCAO;UTI;VACINA;VACINA_COV;ID_MUNICIP\n";

    #[test]
    fn test_parses_and_derives_calendar_fields() {
        let csv = format!("{HEADER}1;2024-12-31;1;5;2;1;2;1;SÃO PAULO\n");
        let parsed = parse_cases(csv.as_bytes()).unwrap();
        assert_eq!(parsed.rows_dropped, 0);
        let record = &parsed.records[0];
        assert_eq!(record.onset_date, NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
        assert_eq!(record.year, 2024);
        assert_eq!(record.month, 12);
        assert_eq!(record.year_week, "2024-01");
        assert_eq!(record.epi_week, 1);
        assert_eq!(record.outcome_code, 2);
        assert_eq!(record.icu_flag, 1);
        assert_eq!(record.covid_vaccine_flag, 1);
        assert_eq!(record.flu_vaccine_flag, 2);
        assert_eq!(record.classification_code, 5);
    }

    #[test]
    fn test_missing_codes_become_ignored_sentinel() {
        let csv = format!("{HEADER}1;2024-05-02;;;;x;;;\n");
        let parsed = parse_cases(csv.as_bytes()).unwrap();
        let record = &parsed.records[0];
        assert_eq!(record.outcome_code, IGNORED);
        assert_eq!(record.icu_flag, IGNORED);
        assert_eq!(record.covid_vaccine_flag, IGNORED);
        assert_eq!(record.flu_vaccine_flag, IGNORED);
        assert_eq!(record.classification_code, IGNORED);
        assert_eq!(record.epi_week, IGNORED);
    }

    #[test]
    fn test_unparseable_dates_are_dropped_and_counted() {
        let csv = format!(
            "{HEADER}1;;1;5;1;2;2;2;X\n2;not-a-date;1;5;1;2;2;2;X\n3;05/03/2024;10;5;1;2;2;2;X\n"
        );
        let parsed = parse_cases(csv.as_bytes()).unwrap();
        assert_eq!(parsed.rows_dropped, 2);
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].month, 3);
        assert_eq!(parsed.records[0].onset_date.day(), 5);
    }

    #[test]
    fn test_latin1_bytes_do_not_fail() {
        let mut bytes = HEADER.as_bytes().to_vec();
        bytes.extend_from_slice(b"1;2024-05-02;18;5;1;2;2;2;S\xC3O PAULO\n");
        let parsed = parse_cases(&bytes).unwrap();
        assert_eq!(parsed.records.len(), 1);
    }

    #[test]
    fn test_bom_is_stripped() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice(b"DT_SIN_PRI;EVOLUCAO\n2024-05-02;1\n");
        let parsed = parse_cases(&bytes).unwrap();
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].outcome_code, 1);
    }

    #[test]
    fn test_missing_onset_column_is_an_error() {
        let err = parse_cases(b"EVOLUCAO;UTI\n1;1\n").unwrap_err();
        assert!(matches!(err, ReportError::Ingest(_)));
    }
}
