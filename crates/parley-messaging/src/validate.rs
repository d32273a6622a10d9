// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Input validation run before any store access.

use parley_core::{ActionButton, BookingRef, ButtonAction, ParleyError};
use url::Url;

/// Trimmed message text, or a validation error naming `field`.
pub fn content<'a>(field: &str, raw: &'a str, max_chars: usize) -> Result<&'a str, ParleyError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ParleyError::validation(field, "must not be empty"));
    }
    let len = trimmed.chars().count();
    if len > max_chars {
        return Err(ParleyError::validation(
            field,
            format!("must be at most {max_chars} characters (got {len})"),
        ));
    }
    Ok(trimmed)
}

/// Like [`content`], but blank input means "no text".
pub fn optional_content<'a>(
    field: &str,
    raw: Option<&'a str>,
    max_chars: usize,
) -> Result<Option<&'a str>, ParleyError> {
    match raw {
        Some(s) if !s.trim().is_empty() => content(field, s, max_chars).map(Some),
        _ => Ok(None),
    }
}

pub fn booking(booking: &BookingRef) -> Result<(), ParleyError> {
    if booking.booking_id <= 0 {
        return Err(ParleyError::validation(
            "booking.booking_id",
            "must be a positive id",
        ));
    }
    Ok(())
}

pub fn buttons(buttons: &[ActionButton]) -> Result<(), ParleyError> {
    for (i, button) in buttons.iter().enumerate() {
        if button.label.trim().is_empty() {
            return Err(ParleyError::validation(
                format!("buttons[{i}].label"),
                "must not be empty",
            ));
        }
        let url = button.url.trim();
        let ok = match button.action {
            ButtonAction::External => is_absolute_http(url),
            ButtonAction::Navigate => is_relative_path(url) || is_absolute_http(url),
        };
        if !ok {
            let reason = match button.action {
                ButtonAction::External => "external buttons need an absolute http(s) URL",
                ButtonAction::Navigate => "navigate buttons need a path starting with '/' or an absolute http(s) URL",
            };
            return Err(ParleyError::validation(format!("buttons[{i}].url"), reason));
        }
    }
    Ok(())
}

/// Absolute `http(s)` URL with a real host.
fn is_absolute_http(raw: &str) -> bool {
    if raw.chars().any(char::is_whitespace) {
        return false;
    }
    Url::parse(raw).is_ok_and(|url| {
        matches!(url.scheme(), "http" | "https") && url.host_str().is_some_and(|h| !h.is_empty())
    })
}

fn is_relative_path(url: &str) -> bool {
    url.starts_with('/') && !url.starts_with("//") && !url.chars().any(char::is_whitespace)
}
