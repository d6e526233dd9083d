use crate::configuration::CampaignSettings;
use crate::domain::{Recipient, RecipientEmail};

const DEFAULT_TEMPLATE: &str = include_str!("../templates/newsletter.html");

/// A fully formed outbound message, ready to hand to a transport.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub to: RecipientEmail,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
    /// `List-Unsubscribe` header value (URL plus mailto fallback).
    pub list_unsubscribe: String,
    pub inline_images: Vec<InlineImage>,
}

/// An image embedded in the HTML body and referenced by `cid:`.
#[derive(Debug, Clone)]
pub struct InlineImage {
    pub content_id: String,
    pub content: Vec<u8>,
}

/// Turns one recipient into an `OutboundMessage`. Pure: all inputs (template,
/// campaign copy, image bytes) are captured at construction time, and
/// `render` performs no I/O.
pub struct Renderer {
    sender: RecipientEmail,
    campaign: CampaignSettings,
    template: String,
    /// Logo and social icons, referenced from the template by `cid:`.
    images: Vec<InlineImage>,
}

impl Renderer {
    pub fn new(
        sender: RecipientEmail,
        campaign: CampaignSettings,
        template: Option<String>,
        images: Vec<InlineImage>,
    ) -> Self {
        Self {
            sender,
            campaign,
            template: template.unwrap_or_else(|| DEFAULT_TEMPLATE.to_string()),
            images,
        }
    }

    pub fn render(&self, recipient: &Recipient) -> OutboundMessage {
        let subject = match &recipient.display_name {
            Some(name) => self.campaign.subject.replace("{name}", name.as_ref()),
            // No display name: drop the placeholder and any trailing comma.
            None => self
                .campaign
                .subject
                .replace("{name}, ", "")
                .replace("{name}", ""),
        };

        let unsubscribe_url = format!(
            "{}?token={}",
            self.campaign.unsubscribe_base_url, recipient.unsubscribe_token
        );

        let body_html = self.campaign.body.replace('\n', "<br>");
        let html_body = self
            .template
            .replace("{brand_name}", &self.campaign.brand_name)
            .replace("{greeting}", &self.campaign.greeting)
            .replace("{body}", &body_html)
            .replace("{cta_text}", &self.campaign.cta_text)
            .replace("{cta_url}", &self.campaign.cta_url)
            .replace("{unsubscribe_url}", &unsubscribe_url)
            .replace("{social_instagram}", &self.campaign.social_instagram)
            .replace("{social_twitter}", &self.campaign.social_twitter)
            .replace("{social_facebook}", &self.campaign.social_facebook)
            .replace("{social_tiktok}", &self.campaign.social_tiktok);

        let text_body = format!(
            "{}\n\n{}: {}\n\nUnsubscribe: {}\n",
            self.campaign.body, self.campaign.cta_text, self.campaign.cta_url, unsubscribe_url
        );

        let list_unsubscribe = format!(
            "<{}>, <mailto:{}?subject=unsubscribe>",
            unsubscribe_url, self.sender
        );

        OutboundMessage {
            to: recipient.email.clone(),
            subject,
            html_body,
            text_body,
            list_unsubscribe,
            inline_images: self.images.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{InlineImage, Renderer};
    use crate::configuration::CampaignSettings;
    use crate::domain::{Recipient, RecipientEmail, RecipientName};

    fn campaign() -> CampaignSettings {
        CampaignSettings {
            subject: "{name}, your daily lesson is ready".into(),
            body: "Line one.\nLine two.".into(),
            delay_min: 5,
            delay_max: 15,
            batch_size: 20,
            batch_pause: 120,
            unsubscribe_base_url: "https://koko.example/unsubscribe".into(),
            brand_name: "Koko".into(),
            greeting: "Learn Korean today!".into(),
            cta_text: "Start now".into(),
            cta_url: "https://koko.example/lesson".into(),
            social_instagram: "#".into(),
            social_twitter: "#".into(),
            social_facebook: "#".into(),
            social_tiktok: "#".into(),
        }
    }

    fn renderer() -> Renderer {
        let sender = RecipientEmail::parse("hello@koko.example".into()).unwrap();
        Renderer::new(sender, campaign(), None, Vec::new())
    }

    fn recipient(name: Option<&str>) -> Recipient {
        Recipient {
            email: RecipientEmail::parse("jiwoo@example.com".into()).unwrap(),
            display_name: name.map(|n| RecipientName::parse(n.into()).unwrap()),
            unsubscribe_token: "tok123".into(),
        }
    }

    #[test]
    fn subject_is_personalized_when_a_display_name_is_present() {
        let message = renderer().render(&recipient(Some("Jiwoo")));
        assert_eq!(message.subject, "Jiwoo, your daily lesson is ready");
    }

    #[test]
    fn subject_placeholder_is_dropped_without_a_display_name() {
        let message = renderer().render(&recipient(None));
        assert_eq!(message.subject, "your daily lesson is ready");
    }

    #[test]
    fn unsubscribe_link_carries_the_recipient_token() {
        let message = renderer().render(&recipient(None));
        assert!(message
            .html_body
            .contains("https://koko.example/unsubscribe?token=tok123"));
        assert!(message
            .list_unsubscribe
            .starts_with("<https://koko.example/unsubscribe?token=tok123>"));
        assert!(message.list_unsubscribe.contains("mailto:hello@koko.example"));
    }

    #[test]
    fn body_newlines_become_html_breaks() {
        let message = renderer().render(&recipient(None));
        assert!(message.html_body.contains("Line one.<br>Line two."));
        assert!(message.text_body.contains("Line one.\nLine two."));
    }

    #[test]
    fn configured_images_are_attached_inline_with_their_content_ids() {
        let sender = RecipientEmail::parse("hello@koko.example".into()).unwrap();
        let images = vec![
            InlineImage {
                content_id: "brand_logo".into(),
                content: vec![1, 2, 3],
            },
            InlineImage {
                content_id: "icon_instagram".into(),
                content: vec![4, 5],
            },
            InlineImage {
                content_id: "icon_x".into(),
                content: vec![6],
            },
        ];
        let renderer = Renderer::new(sender, campaign(), None, images);
        let message = renderer.render(&recipient(None));
        let ids: Vec<&str> = message
            .inline_images
            .iter()
            .map(|image| image.content_id.as_str())
            .collect();
        assert_eq!(ids, vec!["brand_logo", "icon_instagram", "icon_x"]);
    }

    #[test]
    fn rendering_is_deterministic_for_identical_inputs() {
        let r = renderer();
        let a = r.render(&recipient(Some("Jiwoo")));
        let b = r.render(&recipient(Some("Jiwoo")));
        assert_eq!(a.subject, b.subject);
        assert_eq!(a.html_body, b.html_body);
        assert_eq!(a.text_body, b.text_body);
    }
}
