//! Twilio REST client and webhook authentication.
//!
//! Outbound calls and messages go through the Calls/Messages endpoints
//! with HTTP basic auth and a 10 s timeout. Inbound webhooks are trusted
//! only after their `X-Twilio-Signature` validates: HMAC-SHA1 over the
//! canonical URL plus the posted parameters sorted by name, keyed with
//! the account auth token, compared in constant time.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha1::Sha1;

use berthcare_core::config::TwilioConfig;
use berthcare_core::{ApiError, Result};

pub const TWILIO_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

const DEFAULT_API_BASE: &str = "https://api.twilio.com";

type HmacSha1 = Hmac<Sha1>;

/// Validate an `X-Twilio-Signature` header value against the canonical
/// request URL and the posted form parameters.
pub fn validate_webhook_signature(
    auth_token: &str,
    url: &str,
    params: &[(String, String)],
    signature: &str,
) -> bool {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut payload = String::from(url);
    for (key, value) in sorted {
        payload.push_str(key);
        payload.push_str(value);
    }

    let Ok(expected) = BASE64.decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha1::new_from_slice(auth_token.as_bytes()) else {
        return false;
    };
    mac.update(payload.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

/// Minimal TwiML for a spoken alert.
pub fn voice_twiml(message: &str) -> String {
    let escaped = message
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;");
    format!("<Response><Say voice=\"alice\">{escaped}</Say></Response>")
}

#[derive(Debug, Clone, Deserialize)]
pub struct TwilioResource {
    pub sid: String,
    pub status: String,
}

#[derive(Clone)]
pub struct TwilioClient {
    http: reqwest::Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
    api_base: String,
}

impl TwilioClient {
    pub fn new(cfg: &TwilioConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(TWILIO_TIMEOUT)
            .build()
            .map_err(|e| ApiError::internal(format!("failed to build twilio client: {e}")))?;
        Ok(Self {
            http,
            account_sid: cfg.account_sid.clone(),
            auth_token: cfg.auth_token.clone(),
            from_number: cfg.from_number.clone(),
            api_base: DEFAULT_API_BASE.to_string(),
        })
    }

    pub fn auth_token(&self) -> &str {
        &self.auth_token
    }

    pub async fn send_sms(
        &self,
        to: &str,
        body: &str,
        status_callback: Option<&str>,
    ) -> Result<TwilioResource> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base, self.account_sid
        );
        let mut form = vec![("To", to), ("From", self.from_number.as_str()), ("Body", body)];
        if let Some(callback) = status_callback {
            form.push(("StatusCallback", callback));
        }
        self.post_form(&url, &form).await
    }

    /// Start an outbound call that speaks the given TwiML.
    pub async fn start_call(
        &self,
        to: &str,
        twiml: &str,
        status_callback: Option<&str>,
    ) -> Result<TwilioResource> {
        let url =
            format!("{}/2010-04-01/Accounts/{}/Calls.json", self.api_base, self.account_sid);
        let mut form = vec![("To", to), ("From", self.from_number.as_str()), ("Twiml", twiml)];
        if let Some(callback) = status_callback {
            form.push(("StatusCallback", callback));
        }
        self.post_form(&url, &form).await
    }

    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<TwilioResource> {
        let response = self
            .http
            .post(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(form)
            .send()
            .await
            .map_err(|e| ApiError::unavailable(format!("twilio request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, body, "twilio rejected outbound request");
            return Err(ApiError::unavailable(format!("twilio responded with {status}")));
        }

        response
            .json::<TwilioResource>()
            .await
            .map_err(|e| ApiError::internal(format!("malformed twilio response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "12345678901234567890123456789012";
    const URL: &str = "https://api.berthcare.ca/v1/webhooks/twilio/voice";

    fn params() -> Vec<(String, String)> {
        vec![
            ("CallSid".to_string(), "CA1234567890abcdef".to_string()),
            ("From".to_string(), "+14155551234".to_string()),
            ("CallStatus".to_string(), "completed".to_string()),
        ]
    }

    fn sign(token: &str, url: &str, params: &[(String, String)]) -> String {
        let mut sorted: Vec<&(String, String)> = params.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        let mut payload = String::from(url);
        for (k, v) in sorted {
            payload.push_str(k);
            payload.push_str(v);
        }
        let mut mac = HmacSha1::new_from_slice(token.as_bytes()).unwrap();
        mac.update(payload.as_bytes());
        BASE64.encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_valid_signature_accepted() {
        let signature = sign(TOKEN, URL, &params());
        assert!(validate_webhook_signature(TOKEN, URL, &params(), &signature));
    }

    #[test]
    fn test_param_order_does_not_matter() {
        let mut reversed = params();
        reversed.reverse();
        let signature = sign(TOKEN, URL, &params());
        assert!(validate_webhook_signature(TOKEN, URL, &reversed, &signature));
    }

    #[test]
    fn test_tampered_param_rejected() {
        let signature = sign(TOKEN, URL, &params());
        let mut tampered = params();
        tampered[1].1 = "+15005550000".to_string();
        assert!(!validate_webhook_signature(TOKEN, URL, &tampered, &signature));
    }

    #[test]
    fn test_wrong_token_and_url_rejected() {
        let signature = sign(TOKEN, URL, &params());
        assert!(!validate_webhook_signature("wrong-token", URL, &params(), &signature));
        assert!(!validate_webhook_signature(
            TOKEN,
            "https://attacker.example/webhook",
            &params(),
            &signature
        ));
    }

    #[test]
    fn test_garbage_signature_rejected() {
        assert!(!validate_webhook_signature(TOKEN, URL, &params(), "not base64!!!"));
        assert!(!validate_webhook_signature(TOKEN, URL, &params(), ""));
    }

    #[test]
    fn test_voice_twiml_escapes_message() {
        let twiml = voice_twiml("Check on client <Anna & Bob>");
        assert!(twiml.contains("&lt;Anna &amp; Bob&gt;"));
        assert!(twiml.starts_with("<Response><Say"));
    }
}
