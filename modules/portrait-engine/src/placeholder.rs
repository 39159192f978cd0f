// Placeholder synthesis: a coloured square with the person's initial,
// uploaded under the canonical filename.

use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::PortraitError;
use crate::traits::{bounded, BlobStore};
use crate::types::{object_path, PersonIdentity};

pub const PLACEHOLDER_FILENAME: &str = "profile.svg";
pub const PLACEHOLDER_CONTENT_TYPE: &str = "image/svg+xml";

const SIZE: u32 = 256;

/// Background colours. Dark enough for white text.
const PALETTE: &[&str] = &[
    "#1abc9c", "#16a085", "#27ae60", "#2980b9", "#8e44ad", "#2c3e50", "#d35400", "#c0392b",
    "#7f8c8d", "#e67e22", "#3867d6", "#8854d0",
];

/// Same seed, same colour.
pub fn color_for(seed: &str) -> &'static str {
    let digest = Sha256::digest(seed.as_bytes());
    let idx = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize;
    PALETTE[idx % PALETTE.len()]
}

/// Uppercase first alphanumeric character of the name, else of the
/// fallback, else `?`.
pub fn initial_for(name: Option<&str>, fallback: &str) -> String {
    name.into_iter()
        .chain(std::iter::once(fallback))
        .find_map(|s| s.chars().find(|c| c.is_alphanumeric()))
        .map(|c| c.to_uppercase().collect())
        .unwrap_or_else(|| "?".to_string())
}

pub fn render_svg(initial: &str, color: &str) -> String {
    let half = SIZE / 2;
    let font = SIZE * 45 / 100;
    format!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="{SIZE}" height="{SIZE}" viewBox="0 0 {SIZE} {SIZE}"><rect width="{SIZE}" height="{SIZE}" fill="{color}"/><text x="{half}" y="{half}" dy=".35em" text-anchor="middle" font-family="Helvetica, Arial, sans-serif" font-size="{font}" font-weight="600" fill="#ffffff">{}</text></svg>"##,
        escape_xml(initial)
    )
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Build and upload the placeholder for `person`, returning its public URL.
///
/// The URL is the bare public URL of the object, exactly what a later
/// storage scan produces for it. Upload failure is the one hard failure of a
/// resolution run.
pub async fn synthesize(
    blobs: &dyn BlobStore,
    person: &PersonIdentity,
    display_name: Option<&str>,
    timeout: Duration,
) -> Result<String, PortraitError> {
    let initial = initial_for(display_name, person.seed());
    let color = color_for(person.seed());
    let svg = render_svg(&initial, color);

    let path = object_path(person.primary_owner_key(), PLACEHOLDER_FILENAME);
    bounded(
        timeout,
        "placeholder upload",
        blobs.upload(&path, svg.into_bytes(), PLACEHOLDER_CONTENT_TYPE),
    )
    .await
    .map_err(|e| PortraitError::StorageUpload {
        path: path.clone(),
        message: e.to_string(),
    })?;

    let url = blobs.public_url(&path);

    info!(path = %path, color, initial = %initial, "Placeholder uploaded");
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockBlobStore;

    #[test]
    fn colour_is_stable_per_seed() {
        assert_eq!(color_for("rec-1"), color_for("rec-1"));
        assert!(PALETTE.contains(&color_for("anything")));
    }

    #[test]
    fn initial_prefers_name_then_fallback() {
        assert_eq!(initial_for(Some("ada lovelace"), "rec-1"), "A");
        assert_eq!(initial_for(Some("  "), "rec-1"), "R");
        assert_eq!(initial_for(None, "9f2c"), "9");
        assert_eq!(initial_for(Some("ß"), "x"), "SS");
        assert_eq!(initial_for(None, "--"), "?");
    }

    #[test]
    fn svg_contains_colour_and_escaped_text() {
        let svg = render_svg("<", "#2980b9");
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains(r##"fill="#2980b9""##));
        assert!(svg.contains(">&lt;</text>"));
    }

    #[tokio::test]
    async fn synthesize_uploads_canonical_svg_at_primary_key() {
        let blobs = MockBlobStore::new();
        let person = PersonIdentity {
            raw: "rec-1".into(),
            auth_identity: Some("auth-1".into()),
            record_identity: Some("rec-1".into()),
        };

        let url = synthesize(&blobs, &person, Some("Grace"), Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(url, blobs.public_url("auth-1/profile.svg"));
        let stored = blobs.object_bytes("auth-1/profile.svg").unwrap();
        let svg = String::from_utf8(stored).unwrap();
        assert!(svg.contains(">G</text>"));
        assert!(svg.contains(color_for("rec-1")));
    }

    #[tokio::test]
    async fn repeated_synthesis_does_not_accumulate_objects() {
        let blobs = MockBlobStore::new();
        let person = PersonIdentity::unresolved("raw-1");
        for _ in 0..3 {
            synthesize(&blobs, &person, None, Duration::from_secs(1))
                .await
                .unwrap();
        }
        assert_eq!(blobs.paths(), vec!["raw-1/profile.svg".to_string()]);
    }

    #[tokio::test]
    async fn upload_failure_is_surfaced() {
        let blobs = MockBlobStore::new().failing_uploads();
        let person = PersonIdentity::unresolved("raw-1");
        let err = synthesize(&blobs, &person, None, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, PortraitError::StorageUpload { .. }));
    }
}
