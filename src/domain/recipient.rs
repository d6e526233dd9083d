use crate::domain::{RecipientEmail, RecipientName};

/// One destination address plus personalization data and the opaque token
/// used to build its unsubscribe link. Immutable once loaded for a run.
#[derive(Debug, Clone)]
pub struct Recipient {
    pub email: RecipientEmail,
    pub display_name: Option<RecipientName>,
    pub unsubscribe_token: String,
}
