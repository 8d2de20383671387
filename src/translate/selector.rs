//! Label selector rewriting and evaluation

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

use super::keys::{MARKER_LABEL, NAMESPACE_LABEL};
use super::Translator;

impl Translator {
    /// Rewrite a virtual label selector for use on the host cluster.
    ///
    /// User terms pass through verbatim; the namespace-marker and
    /// cluster-marker terms are ANDed in so the selector only ever matches
    /// objects synced from `virtual_namespace` of this virtual cluster. A
    /// missing selector stays missing (it selects nothing), while an empty one
    /// is scoped like any other.
    pub fn host_label_selector(
        &self,
        selector: Option<&LabelSelector>,
        virtual_namespace: &str,
    ) -> Option<LabelSelector> {
        let selector = selector?;

        let mut match_labels = selector.match_labels.clone().unwrap_or_default();
        match_labels.insert(NAMESPACE_LABEL.to_string(), virtual_namespace.to_string());
        match_labels.insert(MARKER_LABEL.to_string(), self.name().to_string());

        Some(LabelSelector {
            match_labels: Some(match_labels),
            match_expressions: selector.match_expressions.clone(),
        })
    }

    /// Equality selector string selecting every host object owned by this
    /// virtual cluster, suitable for list and watch calls
    pub fn marker_selector(&self) -> String {
        selector_string(&BTreeMap::from([(
            MARKER_LABEL.to_string(),
            self.name().to_string(),
        )]))
    }
}

/// Render equality terms as `k1=v1,k2=v2`
pub fn selector_string(terms: &BTreeMap<String, String>) -> String {
    terms
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join(",")
}

/// Evaluate a label selector against a label set.
///
/// Unknown operators never match.
pub fn label_selector_matches(
    selector: &LabelSelector,
    labels: Option<&BTreeMap<String, String>>,
) -> bool {
    let empty = BTreeMap::new();
    let labels = labels.unwrap_or(&empty);

    let labels_match = selector
        .match_labels
        .iter()
        .flatten()
        .all(|(key, value)| labels.get(key) == Some(value));
    if !labels_match {
        return false;
    }

    selector.match_expressions.iter().flatten().all(|expr| {
        let values = expr.values.as_deref().unwrap_or_default();
        let current = labels.get(&expr.key);
        match expr.operator.as_str() {
            "In" => current.is_some_and(|v| values.contains(v)),
            "NotIn" => current.map_or(true, |v| !values.contains(v)),
            "Exists" => current.is_some(),
            "DoesNotExist" => current.is_none(),
            _ => false,
        }
    })
}

/// Parse an equality selector string (`k1=v1,k2=v2`) into its terms
pub fn parse_selector_string(selector: &str) -> BTreeMap<String, String> {
    selector
        .split(',')
        .filter_map(|term| {
            let (key, value) = term.split_once('=')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelectorRequirement;

    fn translator() -> Translator {
        Translator::single_namespace("suffix", "test").unwrap()
    }

    fn labels(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn host_selector_adds_scoping_terms() {
        let selector = LabelSelector {
            match_labels: Some(labels(&[("app", "nginx")])),
            ..Default::default()
        };

        let host = translator()
            .host_label_selector(Some(&selector), "default")
            .unwrap();

        assert_eq!(
            host.match_labels.unwrap(),
            labels(&[
                ("app", "nginx"),
                (NAMESPACE_LABEL, "default"),
                (MARKER_LABEL, "suffix"),
            ])
        );
        assert!(host.match_expressions.is_none());
    }

    #[test]
    fn missing_selector_stays_missing() {
        assert!(translator().host_label_selector(None, "default").is_none());
    }

    #[test]
    fn empty_selector_is_scoped_to_virtual_namespace() {
        let t = translator();
        let host = t
            .host_label_selector(Some(&LabelSelector::default()), "default")
            .unwrap();

        let same_ns = labels(&[(NAMESPACE_LABEL, "default"), (MARKER_LABEL, "suffix")]);
        let other_ns = labels(&[(NAMESPACE_LABEL, "other"), (MARKER_LABEL, "suffix")]);
        let unmanaged = labels(&[("app", "nginx")]);

        assert!(label_selector_matches(&host, Some(&same_ns)));
        assert!(!label_selector_matches(&host, Some(&other_ns)));
        assert!(!label_selector_matches(&host, Some(&unmanaged)));
    }

    #[test]
    fn expressions_pass_through_and_evaluate() {
        let selector = LabelSelector {
            match_labels: None,
            match_expressions: Some(vec![
                LabelSelectorRequirement {
                    key: "tier".into(),
                    operator: "In".into(),
                    values: Some(vec!["web".into(), "api".into()]),
                },
                LabelSelectorRequirement {
                    key: "canary".into(),
                    operator: "DoesNotExist".into(),
                    values: None,
                },
            ]),
        };
        let host = translator()
            .host_label_selector(Some(&selector), "default")
            .unwrap();
        assert_eq!(host.match_expressions, selector.match_expressions);

        let pod = labels(&[
            ("tier", "web"),
            (NAMESPACE_LABEL, "default"),
            (MARKER_LABEL, "suffix"),
        ]);
        assert!(label_selector_matches(&host, Some(&pod)));

        let mut canary = pod.clone();
        canary.insert("canary".into(), "true".into());
        assert!(!label_selector_matches(&host, Some(&canary)));
    }

    #[test]
    fn selector_strings_round_trip() {
        let terms = labels(&[("a", "1"), ("b", "2")]);
        assert_eq!(selector_string(&terms), "a=1,b=2");
        assert_eq!(parse_selector_string("a=1, b=2"), terms);
        assert_eq!(translator().marker_selector(), format!("{}=suffix", MARKER_LABEL));
    }
}
