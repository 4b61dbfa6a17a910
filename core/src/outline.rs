//! The structured ontology: a parallel, read-mostly outline of numbered
//! sections and named subsections, cohabiting with the graph but never
//! participating in its invariants (see design note "outline vs graph").

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub subsections: BTreeMap<String, Vec<String>>,
    /// Any keys beyond `title`/`subsections` present in the source
    /// document, preserved verbatim for round-trip fidelity.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Mapping from integer section number to its title and subsections.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StructuredOntology(pub BTreeMap<i64, Section>);

/// What kind of match a `find_section_by_topic` hit recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicMatchKind {
    SubsectionTitle,
    Item,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubsectionMatch {
    pub subsection: String,
    pub kind: TopicMatchKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopicHit {
    pub section: i64,
    pub title: String,
    pub title_match: bool,
    pub subsection_matches: Vec<SubsectionMatch>,
}

impl StructuredOntology {
    pub fn get_subsection_content(&self, section_num: i64, subsection_name: &str) -> Option<&Vec<String>> {
        let section = self.0.get(&section_num)?;
        if let Some(items) = section.subsections.get(subsection_name) {
            return Some(items);
        }
        let needle = subsection_name.to_lowercase();
        section
            .subsections
            .iter()
            .find(|(name, _)| name.to_lowercase() == needle)
            .map(|(_, items)| items)
    }

    /// Scan the outline for a case-insensitive substring match against
    /// section titles, subsection names, and item strings.
    pub fn find_section_by_topic(&self, topic: &str) -> Vec<TopicHit> {
        let needle = topic.to_lowercase();
        let mut hits = Vec::new();

        for (num, section) in &self.0 {
            let title_match = section.title.to_lowercase().contains(&needle);
            let mut subsection_matches = Vec::new();

            for (sub_name, items) in &section.subsections {
                if sub_name.to_lowercase().contains(&needle) {
                    subsection_matches.push(SubsectionMatch {
                        subsection: sub_name.clone(),
                        kind: TopicMatchKind::SubsectionTitle,
                        item: None,
                    });
                }
                for item in items {
                    if item.to_lowercase().contains(&needle) {
                        subsection_matches.push(SubsectionMatch {
                            subsection: sub_name.clone(),
                            kind: TopicMatchKind::Item,
                            item: Some(item.clone()),
                        });
                    }
                }
            }

            if title_match || !subsection_matches.is_empty() {
                hits.push(TopicHit {
                    section: *num,
                    title: section.title.clone(),
                    title_match,
                    subsection_matches,
                });
            }
        }

        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StructuredOntology {
        let mut subs = BTreeMap::new();
        subs.insert(
            "Feedback".to_string(),
            vec!["Negative feedback loops".to_string(), "Homeostasis".to_string()],
        );
        let mut sections = BTreeMap::new();
        sections.insert(
            1,
            Section {
                title: "Foundations of Cybernetics".to_string(),
                subsections: subs,
                extra: Map::new(),
            },
        );
        StructuredOntology(sections)
    }

    #[test]
    fn finds_title_and_item_matches() {
        let ontology = sample();
        let hits = ontology.find_section_by_topic("feedback");
        assert_eq!(hits.len(), 1);
        assert!(!hits[0].title_match);
        assert_eq!(hits[0].subsection_matches.len(), 2);
    }

    #[test]
    fn subsection_lookup_is_case_insensitive_fallback() {
        let ontology = sample();
        assert!(ontology.get_subsection_content(1, "feedback").is_some());
        assert!(ontology.get_subsection_content(1, "FEEDBACK").is_some());
        assert!(ontology.get_subsection_content(2, "feedback").is_none());
    }
}
