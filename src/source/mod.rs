mod supabase;

use crate::domain::Recipient;
use async_trait::async_trait;
pub use supabase::SupabaseRecipientSource;

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("the recipient store could not be reached: {0}")]
    Unavailable(#[from] reqwest::Error),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

/// Supplies the deduplicated, validated, ordered recipient list for a run.
#[async_trait]
pub trait RecipientSource {
    async fn fetch_recipients(&self) -> Result<Vec<Recipient>, SourceError>;
}
