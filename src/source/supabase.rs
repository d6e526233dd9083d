use crate::configuration::RecipientSourceSettings;
use crate::domain::{Recipient, RecipientEmail, RecipientName};
use crate::source::{RecipientSource, SourceError};
use async_trait::async_trait;
use rand::RngCore;
use secrecy::{ExposeSecret, Secret};
use std::collections::HashSet;

/// Reads the subscriber table through Supabase's PostgREST endpoint.
pub struct SupabaseRecipientSource {
    http: reqwest::Client,
    url: String,
    api_key: Secret<String>,
    table: String,
}

#[derive(serde::Deserialize)]
struct SubscriberRow {
    email: String,
    display_name: Option<String>,
    unsubscribe_token: Option<String>,
}

impl SupabaseRecipientSource {
    pub fn new(settings: &RecipientSourceSettings, timeout: std::time::Duration) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("Failed to build HTTP client"),
            url: settings.url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            table: settings.table.clone(),
        }
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.url, self.table)
    }

    #[tracing::instrument(name = "Storing a freshly minted unsubscribe token", skip(self, token))]
    async fn store_token(&self, email: &str, token: &str) -> Result<(), reqwest::Error> {
        self.http
            .patch(self.table_url())
            .query(&[("email", format!("eq.{}", email))])
            .header("apikey", self.api_key.expose_secret())
            .bearer_auth(self.api_key.expose_secret())
            .json(&serde_json::json!({ "unsubscribe_token": token }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl RecipientSource for SupabaseRecipientSource {
    #[tracing::instrument(name = "Fetching pending recipients", skip(self))]
    async fn fetch_recipients(&self) -> Result<Vec<Recipient>, SourceError> {
        let rows: Vec<SubscriberRow> = self
            .http
            .get(self.table_url())
            .query(&[
                ("select", "email,display_name,unsubscribe_token"),
                ("unsubscribed", "eq.false"),
            ])
            .header("apikey", self.api_key.expose_secret())
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut seen = HashSet::new();
        let mut recipients = Vec::with_capacity(rows.len());
        for row in rows {
            let email = match RecipientEmail::parse(row.email) {
                Ok(email) => email,
                Err(error) => {
                    tracing::warn!(
                        %error,
                        "Skipping a subscriber. Their stored email address is invalid",
                    );
                    continue;
                }
            };
            if !seen.insert(email.clone()) {
                continue;
            }
            let display_name = row
                .display_name
                .and_then(|name| match RecipientName::parse(name) {
                    Ok(name) => Some(name),
                    Err(error) => {
                        tracing::warn!(%error, recipient = %email, "Ignoring an invalid display name");
                        None
                    }
                });
            let unsubscribe_token = match row.unsubscribe_token.filter(|t| !t.is_empty()) {
                Some(token) => token,
                None => {
                    let token = mint_token();
                    if let Err(error) = self.store_token(email.as_ref(), &token).await {
                        // The run proceeds with the unstored token; only the
                        // unsubscribe link on the next campaign is at risk.
                        tracing::warn!(%error, recipient = %email, "Failed to store an unsubscribe token");
                    }
                    token
                }
            };
            recipients.push(Recipient {
                email,
                display_name,
                unsubscribe_token,
            });
        }
        tracing::info!(count = recipients.len(), "Recipient list loaded");
        Ok(recipients)
    }
}

/// 16 random bytes, URL-safe base64 without padding.
fn mint_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::encode_config(bytes, base64::URL_SAFE_NO_PAD)
}

#[cfg(test)]
mod tests {
    use super::mint_token;

    #[test]
    fn minted_tokens_are_url_safe_and_unpadded() {
        let token = mint_token();
        assert_eq!(token.len(), 22);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn minted_tokens_are_unique() {
        assert_ne!(mint_token(), mint_token());
    }
}
