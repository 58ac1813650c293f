//! Parser for the Prometheus text exposition format, for assertions only.

use std::collections::{BTreeMap, HashMap};

/// One sample line, e.g. `api_http_requests_total{method="GET"} 3`
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

/// Parsed exposition text
///
/// Lines that do not parse are kept in [`malformed`](Self::malformed) rather
/// than failing, so tests can assert on them.
#[derive(Debug, Clone, Default)]
pub struct ExpositionSnapshot {
    types: Vec<(String, String)>,
    samples: Vec<Sample>,
    malformed: Vec<String>,
}

impl ExpositionSnapshot {
    pub fn parse(text: &str) -> Self {
        let mut snapshot = Self::default();

        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if let Some(rest) = line.strip_prefix("# TYPE ") {
                let mut parts = rest.split_whitespace();
                match (parts.next(), parts.next()) {
                    (Some(name), Some(kind)) => {
                        snapshot.types.push((name.to_string(), kind.to_string()))
                    }
                    _ => snapshot.malformed.push(line.to_string()),
                }
            } else if line.starts_with('#') {
                continue;
            } else {
                match parse_sample(line) {
                    Some(sample) => snapshot.samples.push(sample),
                    None => snapshot.malformed.push(line.to_string()),
                }
            }
        }

        snapshot
    }

    /// Declared type of a family (`counter`, `gauge`, `histogram`)
    pub fn metric_type(&self, family: &str) -> Option<&str> {
        self.types
            .iter()
            .find(|(name, _)| name == family)
            .map(|(_, kind)| kind.as_str())
    }

    /// How often each family name appears in a TYPE line
    pub fn type_counts(&self) -> HashMap<&str, usize> {
        let mut counts = HashMap::new();
        for (name, _) in &self.types {
            *counts.entry(name.as_str()).or_insert(0) += 1;
        }
        counts
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn malformed(&self) -> &[String] {
        &self.malformed
    }

    /// Value of the sample whose label set equals `labels` exactly
    pub fn value(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        self.samples
            .iter()
            .find(|s| {
                s.name == name
                    && s.labels.len() == labels.len()
                    && labels
                        .iter()
                        .all(|(k, v)| s.labels.get(*k).map(String::as_str) == Some(*v))
            })
            .map(|s| s.value)
    }

    /// Sum of all samples named `name` carrying at least the given labels
    pub fn sum(&self, name: &str, labels: &[(&str, &str)]) -> f64 {
        self.samples
            .iter()
            .filter(|s| {
                s.name == name
                    && labels
                        .iter()
                        .all(|(k, v)| s.labels.get(*k).map(String::as_str) == Some(*v))
            })
            .map(|s| s.value)
            .sum()
    }

    /// True when any sample named `name` exists
    pub fn contains(&self, name: &str) -> bool {
        self.samples.iter().any(|s| s.name == name)
    }
}

fn parse_sample(line: &str) -> Option<Sample> {
    let (name, labels, rest) = match line.find('{') {
        Some(open) => {
            let (labels, consumed) = parse_labels(&line[open + 1..])?;
            (&line[..open], labels, &line[open + 1 + consumed..])
        }
        None => {
            let end = line.find(char::is_whitespace)?;
            (&line[..end], BTreeMap::new(), &line[end..])
        }
    };

    // an optional timestamp may follow the value
    let value = rest.split_whitespace().next()?;
    let value = match value {
        "+Inf" => f64::INFINITY,
        "-Inf" => f64::NEG_INFINITY,
        other => other.parse().ok()?,
    };

    Some(Sample {
        name: name.to_string(),
        labels,
        value,
    })
}

/// Parse `k="v",...}` and return the labels plus the bytes consumed
fn parse_labels(input: &str) -> Option<(BTreeMap<String, String>, usize)> {
    let mut labels = BTreeMap::new();
    let mut chars = input.char_indices().peekable();

    loop {
        while chars.next_if(|(_, c)| *c == ',' || c.is_whitespace()).is_some() {}

        let (start, c) = chars.next()?;
        if c == '}' {
            return Some((labels, start + 1));
        }

        let mut key = String::from(c);
        loop {
            let (_, c) = chars.next()?;
            if c == '=' {
                break;
            }
            key.push(c);
        }

        if chars.next()?.1 != '"' {
            return None;
        }

        let mut value = String::new();
        loop {
            match chars.next()?.1 {
                '"' => break,
                '\\' => match chars.next()?.1 {
                    'n' => value.push('\n'),
                    other => value.push(other),
                },
                other => value.push(other),
            }
        }

        labels.insert(key.trim().to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = r#"# HELP api_http_requests_total Total number of HTTP requests
# TYPE api_http_requests_total counter
api_http_requests_total{method="GET",path="/users/:id",status="200"} 2
api_http_requests_total{method="GET",path="/users/:id",status="404"} 1
# TYPE api_global_exceptions_total counter
api_global_exceptions_total 4
# TYPE api_request_size_bytes histogram
api_request_size_bytes_bucket{method="POST",path="/q \"x\"",le="+Inf"} 1
"#;

    #[test]
    fn test_parse_types_and_values() {
        let snapshot = ExpositionSnapshot::parse(TEXT);

        assert_eq!(snapshot.metric_type("api_http_requests_total"), Some("counter"));
        assert_eq!(snapshot.metric_type("api_request_size_bytes"), Some("histogram"));
        assert_eq!(snapshot.type_counts()["api_http_requests_total"], 1);
        assert!(snapshot.malformed().is_empty());

        assert_eq!(snapshot.value("api_global_exceptions_total", &[]), Some(4.0));
        assert_eq!(
            snapshot.value(
                "api_http_requests_total",
                &[("method", "GET"), ("path", "/users/:id"), ("status", "404")]
            ),
            Some(1.0)
        );
        assert_eq!(
            snapshot.sum("api_http_requests_total", &[("path", "/users/:id")]),
            3.0
        );
    }

    #[test]
    fn test_escaped_label_and_inf_bucket() {
        let snapshot = ExpositionSnapshot::parse(TEXT);
        let bucket = &snapshot
            .samples()
            .iter()
            .find(|s| s.name == "api_request_size_bytes_bucket")
            .unwrap();
        assert_eq!(bucket.labels["path"], "/q \"x\"");
        assert_eq!(bucket.labels["le"], "+Inf");
        assert_eq!(bucket.value, 1.0);
    }

    #[test]
    fn test_malformed_lines_are_collected() {
        let snapshot = ExpositionSnapshot::parse("broken{method=\"GET\" 1\n");
        assert_eq!(snapshot.malformed().len(), 1);
        assert!(!snapshot.contains("broken"));
    }
}
