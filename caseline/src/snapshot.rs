//! Discovery of dated snapshots for sources that publish under date-templated URLs.

use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::{Duration, NaiveDate};
use futures::future::join_all;
use log::{debug, info, warn};
use regex::{Captures, Regex};
use reqwest::{header::CONTENT_LENGTH, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::{CaseLineError, CaseLineResult};

/// Name of the placeholder substituted with candidate snapshot dates.
pub const DATE_PLACEHOLDER: &str = "date";
pub const DEFAULT_SNAPSHOT_DATE_FORMAT: &str = "%Y%m%d";

static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();

fn placeholder_regex() -> &'static Regex {
    PLACEHOLDER.get_or_init(|| Regex::new(r"\{(\w+)\}").expect("Invalid placeholder pattern"))
}

/// A single retrieval request as handed to the retrieval collaborator. Anything besides `url` and
/// `name` is passed through untouched.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct FetchOptions {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl FetchOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Same options pointing at a different URL.
    pub fn with_url(&self, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..self.clone()
        }
    }

    pub fn with_name(self, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }

    pub fn has_placeholder(&self, placeholder: &str) -> bool {
        placeholders(&self.url).iter().any(|p| p == placeholder)
    }
}

/// Names of all `{placeholder}`s in a URL template, in order of appearance.
pub fn placeholders(template: &str) -> Vec<String> {
    placeholder_regex()
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Substitute the named placeholders found in `values`. Unknown placeholders are left intact so a
/// template can be expanded in several passes (e.g. state first, date later).
pub fn expand_url_template(template: &str, values: &HashMap<&str, String>) -> String {
    placeholder_regex()
        .replace_all(template, |caps: &Captures| {
            values
                .get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Every day in `[start, end)`.
pub fn date_range(
    start: NaiveDate,
    end: NaiveDate,
) -> impl DoubleEndedIterator<Item = NaiveDate> {
    let days = (end - start).num_days().max(0);
    (0..days).map(move |offset| start + Duration::days(offset))
}

/// Existence check for a candidate snapshot URL.
#[allow(async_fn_in_trait)]
pub trait SnapshotProbe {
    async fn exists(&self, url: &str) -> CaseLineResult<bool>;
}

/// Probes with a HEAD request. A snapshot exists when the server answers 200 and declares a
/// positive content length.
#[derive(Clone, Debug, Default)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl SnapshotProbe for HttpProbe {
    async fn exists(&self, url: &str) -> CaseLineResult<bool> {
        let response = self.client.head(url).send().await?;
        let content_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(0);
        debug!(
            "HEAD {url}: status {}, content length {content_length}",
            response.status()
        );
        Ok(response.status() == StatusCode::OK && content_length > 0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub date: NaiveDate,
    pub url: String,
}

/// Walk `[start, end)` from the most recent date backwards and return the first date whose
/// templated URL exists. A failing probe counts as "absent" for that date only.
pub async fn locate_snapshot<P: SnapshotProbe>(
    probe: &P,
    template: &str,
    start: NaiveDate,
    end: NaiveDate,
    date_format: &str,
) -> CaseLineResult<Snapshot> {
    if !placeholders(template).iter().any(|p| p == DATE_PLACEHOLDER) {
        return Err(CaseLineError::SchemaMismatch(format!(
            "URL template '{template}' has no {{{DATE_PLACEHOLDER}}} placeholder"
        )));
    }
    for date in date_range(start, end).rev() {
        let url = expand_url_template(
            template,
            &HashMap::from([(DATE_PLACEHOLDER, date.format(date_format).to_string())]),
        );
        match probe.exists(&url).await {
            Ok(true) => {
                info!("Found snapshot for {date} at {url}");
                return Ok(Snapshot { date, url });
            }
            Ok(false) => debug!("No snapshot at {url}"),
            Err(err) => warn!("Probe for {url} failed: {err}"),
        }
    }
    Err(CaseLineError::SnapshotNotFound {
        template: template.to_string(),
        start,
        end,
    })
}

/// Resolve every option carrying a `{date}` placeholder to its latest snapshot. Options are
/// located concurrently; options without the placeholder pass through unchanged.
pub async fn locate_all<P: SnapshotProbe>(
    probe: &P,
    options: &[FetchOptions],
    start: NaiveDate,
    end: NaiveDate,
    date_format: &str,
) -> CaseLineResult<Vec<FetchOptions>> {
    join_all(options.iter().map(|opts| async move {
        if !opts.has_placeholder(DATE_PLACEHOLDER) {
            return Ok::<_, CaseLineError>(opts.clone());
        }
        let snapshot = locate_snapshot(probe, &opts.url, start, end, date_format).await?;
        Ok(opts.with_url(snapshot.url))
    }))
    .await
    .into_iter()
    .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use httpmock::prelude::*;
    use httpmock::Method::HEAD;

    use super::*;

    struct StubProbe {
        available: HashSet<String>,
        probed: Mutex<Vec<String>>,
    }

    impl StubProbe {
        fn new(available: &[&str]) -> Self {
            Self {
                available: available.iter().map(|s| s.to_string()).collect(),
                probed: Mutex::new(vec![]),
            }
        }
    }

    impl SnapshotProbe for StubProbe {
        async fn exists(&self, url: &str) -> CaseLineResult<bool> {
            self.probed.lock().unwrap().push(url.to_string());
            Ok(self.available.contains(url))
        }
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    const TEMPLATE: &str = "https://example.org/DOH_{date}.csv";

    #[test]
    fn test_date_range_is_half_open() {
        let days: Vec<NaiveDate> = date_range(ymd(2021, 8, 30), ymd(2021, 9, 2)).collect();
        assert_eq!(days, vec![ymd(2021, 8, 30), ymd(2021, 8, 31), ymd(2021, 9, 1)]);
        assert_eq!(date_range(ymd(2021, 9, 2), ymd(2021, 9, 2)).count(), 0);
    }

    #[test]
    fn test_expand_url_template_keeps_unknown_placeholders() {
        let url = expand_url_template(
            "https://example.org/{subregion1_code}/{date}.csv",
            &HashMap::from([("subregion1_code", "SP".to_string())]),
        );
        assert_eq!(url, "https://example.org/SP/{date}.csv");
        assert_eq!(placeholders(&url), vec!["date".to_string()]);
    }

    #[tokio::test]
    async fn test_locate_snapshot_returns_most_recent_hit() {
        let probe = StubProbe::new(&[
            "https://example.org/DOH_20210901.csv",
            "https://example.org/DOH_20210903.csv",
        ]);
        let snapshot = locate_snapshot(
            &probe,
            TEMPLATE,
            ymd(2021, 8, 31),
            ymd(2021, 9, 5),
            DEFAULT_SNAPSHOT_DATE_FORMAT,
        )
        .await
        .unwrap();
        assert_eq!(snapshot.date, ymd(2021, 9, 3));
        assert_eq!(snapshot.url, "https://example.org/DOH_20210903.csv");
        // Search stops at the first hit
        assert_eq!(
            *probe.probed.lock().unwrap(),
            vec![
                "https://example.org/DOH_20210904.csv".to_string(),
                "https://example.org/DOH_20210903.csv".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_locate_snapshot_exhausts_range() {
        let probe = StubProbe::new(&[]);
        let result = locate_snapshot(
            &probe,
            TEMPLATE,
            ymd(2021, 8, 31),
            ymd(2021, 9, 3),
            DEFAULT_SNAPSHOT_DATE_FORMAT,
        )
        .await;
        assert!(matches!(
            result,
            Err(CaseLineError::SnapshotNotFound { .. })
        ));
        assert_eq!(probe.probed.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_locate_all_passes_through_static_urls() {
        let probe = StubProbe::new(&["https://example.org/DOH_20210901.csv"]);
        let options = vec![
            FetchOptions::new(TEMPLATE).with_name("cases"),
            FetchOptions::new("https://example.org/static.csv"),
        ];
        let located = locate_all(
            &probe,
            &options,
            ymd(2021, 8, 31),
            ymd(2021, 9, 2),
            DEFAULT_SNAPSHOT_DATE_FORMAT,
        )
        .await
        .unwrap();
        assert_eq!(located[0].url, "https://example.org/DOH_20210901.csv");
        assert_eq!(located[0].name.as_deref(), Some("cases"));
        assert_eq!(located[1], options[1]);
    }

    #[test]
    fn test_fetch_options_keep_extra_fields() {
        let opts: FetchOptions =
            serde_json::from_str(r#"{"url": "https://example.org/{date}.csv", "read_opts": {"sep": ";"}}"#)
                .unwrap();
        assert!(opts.has_placeholder(DATE_PLACEHOLDER));
        assert!(opts.extra.contains_key("read_opts"));
        let moved = opts.with_url("https://example.org/20210901.csv");
        assert_eq!(moved.extra, opts.extra);
    }

    #[tokio::test]
    async fn test_http_probe() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(HEAD).path("/DOH_20210901.csv");
            then.status(200).body("a,b\n1,2\n");
        });
        server.mock(|when, then| {
            when.method(HEAD).path("/DOH_20210902.csv");
            then.status(404);
        });

        let probe = HttpProbe::default();
        assert!(probe
            .exists(&server.url("/DOH_20210901.csv"))
            .await
            .unwrap());
        assert!(!probe
            .exists(&server.url("/DOH_20210902.csv"))
            .await
            .unwrap());

        let snapshot = locate_snapshot(
            &probe,
            &server.url("/DOH_{date}.csv"),
            ymd(2021, 8, 31),
            ymd(2021, 9, 3),
            DEFAULT_SNAPSHOT_DATE_FORMAT,
        )
        .await
        .unwrap();
        assert_eq!(snapshot.date, ymd(2021, 9, 1));
    }
}
