use super::stage::{Stage, StageName};
use super::state::PipelineState;
use crate::error::ReportError;
use crate::news::{NewsBundle, NewsSearch};

pub struct NewsStage {
    search: NewsSearch,
}

impl NewsStage {
    pub fn new(search: NewsSearch) -> Self {
        Self { search }
    }
}

#[async_trait::async_trait]
impl Stage for NewsStage {
    type Output = NewsBundle;

    fn name(&self) -> StageName {
        StageName::News
    }

    async fn run(&self, _state: &PipelineState) -> Result<NewsBundle, ReportError> {
        let articles = self.search.search().await?;
        Ok(NewsBundle::from_articles(articles))
    }
}
