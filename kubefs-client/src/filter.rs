use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// A compiled comma-separated pattern list.
///
/// * Multiple patterns are separated by commas (`,`)
/// * Prefix a pattern with `!` for **negative** filtering
/// * **All** patterns must match for a row to be kept
///
/// A pattern matches a row when **any** of its fields contains the
/// pattern's text, ignoring case.
///
/// ```text
/// "web,!canary"
/// └── keep rows that
///     ├─ contain "web"
///     └─ do **not** contain "canary"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextFilter {
    patterns: Vec<(bool, String)>,
}

impl TextFilter {
    pub fn parse(patterns: &str) -> Self {
        let patterns = patterns
            .split(',')
            .filter_map(|raw| {
                let raw = raw.trim();
                if raw.is_empty() {
                    return None;
                }
                let (negative, text) = match raw.strip_prefix('!') {
                    Some(rest) => (true, rest),
                    None => (false, raw),
                };
                // a bare "!" filters nothing
                (!text.is_empty()).then(|| (negative, text.to_lowercase()))
            })
            .collect();
        Self { patterns }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn matches<S: AsRef<str>>(&self, fields: &[S]) -> bool {
        let fields: Vec<String> = fields.iter().map(|f| f.as_ref().to_lowercase()).collect();
        self.patterns.iter().all(|(negative, pat)| {
            let found = fields.iter().any(|f| f.contains(pat.as_str()));
            found != *negative
        })
    }
}

/// `key=value` label requirements, all of which must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelFilter {
    wanted: Vec<(String, String)>,
}

impl LabelFilter {
    /// Entries without `=` are ignored.
    pub fn parse<S: AsRef<str>>(selectors: &[S]) -> Self {
        let wanted = selectors
            .iter()
            .flat_map(|s| s.as_ref().split(','))
            .filter_map(|pair| {
                let (k, v) = pair.split_once('=')?;
                let k = k.trim();
                (!k.is_empty()).then(|| (k.to_string(), v.trim().to_string()))
            })
            .collect();
        Self { wanted }
    }

    pub fn is_empty(&self) -> bool {
        self.wanted.is_empty()
    }

    pub fn matches(&self, meta: &ObjectMeta) -> bool {
        match &meta.labels {
            Some(map) => self
                .wanted
                .iter()
                .all(|(k, v)| map.get(k).is_some_and(|have| have == v)),
            None => self.wanted.is_empty(),
        }
    }
}
