//! Gmail utility functions
//!
//! Body encoding, header lookup, plaintext extraction, and message construction.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, URL_SAFE_NO_PAD};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use lettre::message::Mailboxes;
use mail_builder::headers::address::Address;
use mail_builder::MessageBuilder;

use crate::error::{GmailApiError, GmailMcpError, Result, ValidationError};
use crate::gmail::types::MessagePart;

/// URL-safe alphabet, tolerant of both padded and unpadded input
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encode a raw email message for Gmail API (base64url, no padding)
pub fn encode_raw_message(message: &str) -> String {
    URL_SAFE_NO_PAD.encode(message.as_bytes())
}

/// Decode base64url data from Gmail API
pub fn decode_base64url(data: &str) -> Result<Vec<u8>> {
    URL_SAFE_LENIENT.decode(data).map_err(|e| {
        GmailMcpError::Gmail(GmailApiError::UndecodableBody {
            message: e.to_string(),
        })
    })
}

/// Decode base64url data to a UTF-8 string
pub fn decode_base64url_string(data: &str) -> Result<String> {
    let bytes = decode_base64url(data)?;
    String::from_utf8(bytes).map_err(|e| {
        GmailMcpError::Gmail(GmailApiError::UndecodableBody {
            message: e.to_string(),
        })
    })
}

/// Find header value by name (case-insensitive)
pub fn find_header<'a>(part: &'a MessagePart, name: &str) -> Option<&'a str> {
    part.headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

/// Owned variant of [`find_header`] over an optional payload
pub fn header_value(payload: Option<&MessagePart>, name: &str) -> Option<String> {
    payload.and_then(|p| find_header(p, name)).map(str::to_string)
}

/// Extract the plaintext body of a message payload.
///
/// When the payload has a `parts` array, only its direct children are scanned
/// for the first `text/plain` part; nested multiparts are not descended into.
/// Without a `parts` array the payload's own body data is used. A message with
/// no usable body yields an empty string.
pub fn extract_plain_body(payload: &MessagePart) -> Result<String> {
    match &payload.parts {
        Some(parts) => parts
            .iter()
            .find(|p| p.mime_type.as_deref() == Some("text/plain"))
            .map(decode_part_data)
            .unwrap_or_else(|| Ok(String::new())),
        None => decode_part_data(payload),
    }
}

fn decode_part_data(part: &MessagePart) -> Result<String> {
    match part.body.as_ref().and_then(|b| b.data.as_deref()) {
        Some(data) => decode_base64url_string(data),
        None => Ok(String::new()),
    }
}

/// Parse a recipient list (one or more comma separated mailboxes)
pub fn parse_recipients(to: &str) -> Result<Vec<Address<'static>>> {
    let mailboxes: Mailboxes = to.parse().map_err(|_| {
        GmailMcpError::Validation(ValidationError::InvalidRecipient {
            address: to.to_string(),
        })
    })?;

    let addresses: Vec<Address<'static>> = mailboxes
        .into_iter()
        .map(|mailbox| Address::new_address(mailbox.name, mailbox.email.to_string()))
        .collect();

    if addresses.is_empty() {
        return Err(GmailMcpError::Validation(ValidationError::InvalidRecipient {
            address: to.to_string(),
        }));
    }

    Ok(addresses)
}

/// Build a single-part text/plain RFC 5322 message
pub fn create_text_message(to: &str, subject: &str, body: &str) -> Result<String> {
    let mut recipients = parse_recipients(to)?;
    let to_header = if recipients.len() == 1 {
        recipients.remove(0)
    } else {
        Address::new_list(recipients)
    };

    let message = MessageBuilder::new()
        .to(to_header)
        .subject(subject)
        .text_body(body)
        .write_to_string()?;

    Ok(message)
}
