use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MAX_DOCUMENT_FREQUENCY: f64 = 0.9;

pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|token| token.chars().count() >= 2)
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    pub fn dot(&self, other: &SparseVector) -> f32 {
        let (mut left, mut right) = (0, 0);
        let mut total = 0.0;
        while left < self.indices.len() && right < other.indices.len() {
            match self.indices[left].cmp(&other.indices[right]) {
                std::cmp::Ordering::Less => left += 1,
                std::cmp::Ordering::Greater => right += 1,
                std::cmp::Ordering::Equal => {
                    total += self.values[left] * other.values[right];
                    left += 1;
                    right += 1;
                }
            }
        }
        total
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    vocabulary: BTreeMap<String, u32>,
    idf: Vec<f32>,
}

impl TfidfVectorizer {
    pub fn fit(texts: &[String]) -> Self {
        let total = texts.len();
        let mut document_frequency = BTreeMap::<String, usize>::new();
        for text in texts {
            let mut terms = tokenize(text);
            terms.sort_unstable();
            terms.dedup();
            for term in terms {
                *document_frequency.entry(term).or_default() += 1;
            }
        }

        let ceiling = MAX_DOCUMENT_FREQUENCY * total as f64;
        let mut kept: Vec<(&String, &usize)> = document_frequency
            .iter()
            .filter(|(_, df)| **df as f64 <= ceiling)
            .collect();
        if kept.is_empty() {
            kept = document_frequency.iter().collect();
        }

        let mut vocabulary = BTreeMap::new();
        let mut idf = Vec::with_capacity(kept.len());
        for (column, (term, df)) in kept.into_iter().enumerate() {
            vocabulary.insert(term.clone(), column as u32);
            let weight = ((1.0 + total as f64) / (1.0 + *df as f64)).ln() + 1.0;
            idf.push(weight as f32);
        }

        Self { vocabulary, idf }
    }

    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn transform(&self, text: &str) -> SparseVector {
        let mut counts = BTreeMap::<u32, f32>::new();
        for term in tokenize(text) {
            if let Some(column) = self.vocabulary.get(&term) {
                *counts.entry(*column).or_default() += 1.0;
            }
        }

        let mut vector = SparseVector {
            indices: Vec::with_capacity(counts.len()),
            values: Vec::with_capacity(counts.len()),
        };
        for (column, count) in counts {
            vector.indices.push(column);
            vector.values.push(count * self.idf[column as usize]);
        }

        crate::embeddings::l2_normalize(&mut vector.values);
        vector
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexicalModel {
    vectorizer: TfidfVectorizer,
    rows: Vec<SparseVector>,
}

impl LexicalModel {
    pub fn fit(texts: &[String]) -> Self {
        let vectorizer = TfidfVectorizer::fit(texts);
        let rows = texts.iter().map(|text| vectorizer.transform(text)).collect();
        Self { vectorizer, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn similarities(&self, query: &str) -> Vec<f32> {
        let query = self.vectorizer.transform(query);
        self.rows.iter().map(|row| row.dot(&query)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<String> {
        vec![
            "hydraulic pump pressure relief valve".to_string(),
            "electrical wiring and fuse box layout".to_string(),
            "pump maintenance schedule and oil change".to_string(),
        ]
    }

    #[test]
    fn tokenizer_drops_single_characters() {
        assert_eq!(tokenize("A pump, 2 valves & x_y!"), vec!["pump", "valves", "x_y"]);
    }

    #[test]
    fn ubiquitous_terms_are_pruned() {
        let texts = vec![
            "shared alpha".to_string(),
            "shared beta".to_string(),
            "shared gamma".to_string(),
        ];
        let vectorizer = TfidfVectorizer::fit(&texts);
        assert_eq!(vectorizer.vocabulary_len(), 3);
        assert!(vectorizer.transform("shared").is_empty());
    }

    #[test]
    fn single_text_keeps_its_vocabulary() {
        let model = LexicalModel::fit(&["only one passage here".to_string()]);
        let scores = model.similarities("passage");
        assert_eq!(scores.len(), 1);
        assert!(scores[0] > 0.0);
    }

    #[test]
    fn relevant_text_scores_highest() {
        let model = LexicalModel::fit(&corpus());
        let scores = model.similarities("hydraulic pressure");
        assert!(scores[0] > scores[1]);
        assert!(scores[0] > scores[2]);
        assert_eq!(scores[1], 0.0);
        assert!(scores[0] <= 1.0 + 1e-6);
    }

    #[test]
    fn unseen_query_terms_score_zero() {
        let model = LexicalModel::fit(&corpus());
        assert!(model.similarities("turbine").iter().all(|score| *score == 0.0));
    }
}
