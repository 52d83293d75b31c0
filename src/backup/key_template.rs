// restorecheck/src/backup/key_template.rs
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Days, Local, Months, TimeZone};
use log::warn;
use regex::Regex;
use std::sync::OnceLock;

use crate::errors::{RestoreError, Result};

const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Resolves date placeholders in a backup key against the current time.
///
/// See [`render_at`] for the placeholder syntax.
pub fn render(template: &str) -> Result<String> {
    render_at(template, Local::now())
}

/// Resolves `{{ name }}` / `{{ name:FORMAT }}` placeholders against `now`.
///
/// Recognised names are `today`, `yesterday`, `one_week_ago` and
/// `one_month_ago` (Go-style spellings such as `.OneWeekAgo` also match).
/// `FORMAT` is a strftime string and defaults to `%Y-%m-%d`. Unknown names
/// are left in the output untouched (with a warning). A recognised name
/// followed by anything other than `:FORMAT`, such as a Go-style
/// `.Format "20060102"` call, is a configuration error.
pub fn render_at<Tz: TimeZone>(template: &str, now: DateTime<Tz>) -> Result<String>
where
    Tz::Offset: std::fmt::Display,
{
    static PLACEHOLDER_RE: OnceLock<Regex> = OnceLock::new();
    let re = PLACEHOLDER_RE
        .get_or_init(|| Regex::new(r"\{\{(.*?)\}\}").expect("placeholder pattern is valid"));

    let mut rendered = String::with_capacity(template.len());
    let mut last = 0;
    for caps in re.captures_iter(template) {
        let Some(whole) = caps.get(0) else { continue };
        let literal = &template[last..whole.start()];
        ensure_no_open_brace(literal, template)?;
        rendered.push_str(literal);

        let body = caps[1].trim();
        let (name, format) = match body.split_once(':') {
            Some((name, format)) => (name.trim(), format.trim()),
            None => (body, DEFAULT_DATE_FORMAT),
        };

        match date_for(name, &now) {
            Some(date) => rendered.push_str(&format_date(&date, format, template)?),
            None if has_date_prefix(name, &now) => {
                return Err(RestoreError::Config(format!(
                    "Unsupported placeholder '{}' in key template {}: write it as \
                     '{{{{ name:FORMAT }}}}' with a strftime FORMAT",
                    whole.as_str(),
                    template
                )));
            }
            None => {
                warn!(
                    "Leaving unknown placeholder {} in key template {}",
                    whole.as_str(),
                    template
                );
                rendered.push_str(whole.as_str());
            }
        }
        last = whole.end();
    }

    let tail = &template[last..];
    ensure_no_open_brace(tail, template)?;
    rendered.push_str(tail);
    Ok(rendered)
}

fn ensure_no_open_brace(segment: &str, template: &str) -> Result<()> {
    if segment.contains("{{") {
        return Err(RestoreError::Config(format!(
            "Unclosed '{{{{' in key template: {}",
            template
        )));
    }
    Ok(())
}

fn date_for<Tz: TimeZone>(name: &str, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    let normalized: String = name
        .trim_start_matches('.')
        .chars()
        .filter(|c| *c != '_')
        .collect::<String>()
        .to_ascii_lowercase();

    match normalized.as_str() {
        "today" => Some(now.clone()),
        "yesterday" => now.clone().checked_sub_days(Days::new(1)),
        "oneweekago" => now.clone().checked_sub_days(Days::new(7)),
        "onemonthago" => now.clone().checked_sub_months(Months::new(1)),
        _ => None,
    }
}

/// True when `name` starts with a known date name followed by more text,
/// e.g. `.Yesterday.Format "20060102"`.
fn has_date_prefix<Tz: TimeZone>(name: &str, now: &DateTime<Tz>) -> bool {
    let stem = name.trim_start_matches('.');
    match stem.find(|c: char| c == '.' || c.is_whitespace()) {
        Some(end) => date_for(&stem[..end], now).is_some(),
        None => false,
    }
}

fn format_date<Tz: TimeZone>(date: &DateTime<Tz>, format: &str, template: &str) -> Result<String>
where
    Tz::Offset: std::fmt::Display,
{
    let items: Vec<Item<'_>> = StrftimeItems::new(format).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(RestoreError::Config(format!(
            "Invalid date format '{}' in key template: {}",
            format, template
        )));
    }
    Ok(date.format_with_items(items.into_iter()).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_yesterday_crosses_month_boundary() -> anyhow::Result<()> {
        let key = render_at("daily/{{ yesterday:%Y%m%d }}.sql.gz", reference())?;
        assert_eq!(key, "daily/20240229.sql.gz");
        Ok(())
    }

    #[test]
    fn test_all_placeholders_with_default_format() -> anyhow::Result<()> {
        let key = render_at(
            "{{today}}/{{ yesterday }}/{{one_week_ago}}/{{ one_month_ago }}",
            reference(),
        )?;
        assert_eq!(key, "2024-03-01/2024-02-29/2024-02-23/2024-02-01");
        Ok(())
    }

    #[test]
    fn test_go_style_names() -> anyhow::Result<()> {
        let key = render_at("{{ .Yesterday:%d }}-{{ .OneWeekAgo:%d }}", reference())?;
        assert_eq!(key, "29-23");
        Ok(())
    }

    #[test]
    fn test_one_month_ago_clamps_to_month_end() -> anyhow::Result<()> {
        let now = Utc.with_ymd_and_hms(2024, 3, 31, 0, 0, 0).unwrap();
        assert_eq!(render_at("{{ one_month_ago }}", now)?, "2024-02-29");
        Ok(())
    }

    #[test]
    fn test_unknown_placeholder_left_literal() -> anyhow::Result<()> {
        let key = render_at("backups/{{ env }}/{{ today:%Y }}.tar.gz", reference())?;
        assert_eq!(key, "backups/{{ env }}/2024.tar.gz");
        Ok(())
    }

    #[test]
    fn test_template_without_placeholders_is_unchanged() -> anyhow::Result<()> {
        assert_eq!(render_at("static/dump.sql.gz", reference())?, "static/dump.sql.gz");
        Ok(())
    }

    #[test]
    fn test_unclosed_placeholder_is_config_error() {
        let err = render_at("daily/{{ yesterday.sql.gz", reference()).unwrap_err();
        assert!(matches!(err, RestoreError::Config(_)), "{err}");
    }

    #[test]
    fn test_go_format_call_is_config_error() {
        let err = render_at(r#"daily/{{ .Yesterday.Format "20060102" }}.sql.gz"#, reference())
            .unwrap_err();
        match err {
            RestoreError::Config(message) => assert!(message.contains(".Yesterday.Format"), "{message}"),
            other => panic!("expected a config error, got {:?}", other),
        }
        assert!(matches!(
            render_at("{{ today extra }}", reference()),
            Err(RestoreError::Config(_))
        ));
    }

    #[test]
    fn test_invalid_format_is_config_error() {
        let err = render_at("{{ today:%Q }}", reference()).unwrap_err();
        assert!(matches!(err, RestoreError::Config(_)), "{err}");
    }
}
