use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::models::BookSummary;

/// English stop words excluded from the vocabulary
const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "about", "above", "across", "after", "afterwards", "again", "against", "all", "almost",
    "alone", "along", "already", "also", "although", "always", "am", "among", "amongst", "an",
    "and", "another", "any", "anyhow", "anyone", "anything", "anyway", "anywhere", "are",
    "around", "as", "at", "back", "be", "became", "because", "become", "becomes", "becoming",
    "been", "before", "beforehand", "behind", "being", "below", "beside", "besides", "between",
    "beyond", "both", "but", "by", "can", "cannot", "could", "did", "do", "does", "doing", "done",
    "down", "due", "during", "each", "eg", "either", "else", "elsewhere", "enough", "etc", "even",
    "ever", "every", "everyone", "everything", "everywhere", "except", "few", "for", "former",
    "formerly", "from", "further", "had", "has", "have", "having", "he", "hence", "her", "here",
    "hereafter", "hereby", "herein", "hers", "herself", "him", "himself", "his", "how", "however",
    "ie", "if", "in", "indeed", "into", "is", "it", "its", "itself", "just", "last", "latter",
    "least", "less", "many", "may", "me", "meanwhile", "might", "mine", "more", "moreover", "most",
    "mostly", "much", "must", "my", "myself", "namely", "neither", "never", "nevertheless", "next",
    "no", "nobody", "none", "nor", "not", "nothing", "now", "nowhere", "of", "off", "often", "on",
    "once", "one", "only", "onto", "or", "other", "others", "otherwise", "our", "ours",
    "ourselves", "out", "over", "own", "per", "perhaps", "rather", "same", "seem", "seemed",
    "seeming", "seems", "several", "she", "should", "since", "so", "some", "somehow", "someone",
    "something", "sometime", "sometimes", "somewhere", "still", "such", "than", "that", "the",
    "their", "theirs", "them", "themselves", "then", "thence", "there", "thereafter", "thereby",
    "therefore", "therein", "these", "they", "this", "those", "though", "through", "throughout",
    "thus", "to", "together", "too", "toward", "towards", "under", "until", "up", "upon", "us",
    "very", "via", "was", "we", "well", "were", "what", "whatever", "when", "whence", "whenever",
    "where", "whereafter", "whereas", "whereby", "wherein", "whereupon", "wherever", "whether",
    "which", "while", "who", "whoever", "whole", "whom", "whose", "why", "will", "with", "within",
    "without", "would", "yet", "you", "your", "yours", "yourself", "yourselves",
];

/// Sparse row of a TF-IDF matrix
///
/// Entries are `(term index, weight)` pairs sorted by term index with no
/// duplicates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseVector {
    entries: Vec<(usize, f64)>,
}

impl SparseVector {
    /// Builds a vector from entries in any order, summing duplicate indices
    pub fn from_entries(entries: impl IntoIterator<Item = (usize, f64)>) -> Self {
        let mut merged: BTreeMap<usize, f64> = BTreeMap::new();
        for (index, weight) in entries {
            *merged.entry(index).or_insert(0.0) += weight;
        }
        Self {
            entries: merged.into_iter().filter(|(_, w)| *w != 0.0).collect(),
        }
    }

    pub fn entries(&self) -> &[(usize, f64)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn norm(&self) -> f64 {
        self.entries.iter().map(|(_, w)| w * w).sum::<f64>().sqrt()
    }

    pub fn dot(&self, other: &SparseVector) -> f64 {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0;
        while i < self.entries.len() && j < other.entries.len() {
            let (a_idx, a_w) = self.entries[i];
            let (b_idx, b_w) = other.entries[j];
            match a_idx.cmp(&b_idx) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += a_w * b_w;
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }

    /// Cosine of the angle between two vectors, 0 when either is all zeros
    pub fn cosine(&self, other: &SparseVector) -> f64 {
        let denom = self.norm() * other.norm();
        if denom == 0.0 {
            return 0.0;
        }
        self.dot(other) / denom
    }

    fn normalized(mut self) -> Self {
        let norm = self.norm();
        if norm > 0.0 {
            for (_, w) in &mut self.entries {
                *w /= norm;
            }
        }
        self
    }

    /// Element-wise mean of `vectors`, `None` when there are none
    pub fn mean<'a>(vectors: impl IntoIterator<Item = &'a SparseVector>) -> Option<SparseVector> {
        let mut count = 0usize;
        let mut sums: BTreeMap<usize, f64> = BTreeMap::new();
        for vector in vectors {
            count += 1;
            for &(index, weight) in &vector.entries {
                *sums.entry(index).or_insert(0.0) += weight;
            }
        }
        if count == 0 {
            return None;
        }
        let n = count as f64;
        Some(SparseVector::from_entries(
            sums.into_iter().map(|(index, sum)| (index, sum / n)),
        ))
    }
}

/// Splits text into lowercase tokens of two or more word characters
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|token| token.chars().count() >= 2)
        .map(str::to_lowercase)
        .collect()
}

/// TF-IDF vectorizer with a corpus-derived vocabulary
///
/// Weights are raw term counts times the smoothed inverse document frequency
/// `ln((1 + n) / (1 + df)) + 1`, and every row is L2-normalized.
#[derive(Debug, Clone)]
pub struct TfidfVectorizer {
    stop_words: HashSet<&'static str>,
    vocabulary: HashMap<String, usize>,
    idf: Vec<f64>,
}

impl Default for TfidfVectorizer {
    fn default() -> Self {
        Self::new()
    }
}

impl TfidfVectorizer {
    pub fn new() -> Self {
        Self {
            stop_words: ENGLISH_STOP_WORDS.iter().copied().collect(),
            vocabulary: HashMap::new(),
            idf: Vec::new(),
        }
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn term_index(&self, term: &str) -> Option<usize> {
        self.vocabulary.get(term).copied()
    }

    fn terms(&self, document: &str) -> Vec<String> {
        tokenize(document)
            .into_iter()
            .filter(|token| !self.stop_words.contains(token.as_str()))
            .collect()
    }

    /// Learns the vocabulary and idf weights from `documents`, then vectorizes them
    pub fn fit_transform<S: AsRef<str>>(&mut self, documents: &[S]) -> Vec<SparseVector> {
        let tokenized: Vec<Vec<String>> = documents.iter().map(|d| self.terms(d.as_ref())).collect();

        // Term indices follow lexicographic order so identical corpora give identical models.
        let vocabulary: BTreeSet<&String> = tokenized.iter().flatten().collect();
        self.vocabulary = vocabulary
            .into_iter()
            .enumerate()
            .map(|(index, term)| (term.clone(), index))
            .collect();

        let mut doc_freq = vec![0usize; self.vocabulary.len()];
        for tokens in &tokenized {
            let unique: HashSet<usize> = tokens.iter().filter_map(|t| self.term_index(t)).collect();
            for index in unique {
                doc_freq[index] += 1;
            }
        }

        let n = documents.len() as f64;
        self.idf = doc_freq
            .into_iter()
            .map(|df| ((1.0 + n) / (1.0 + df as f64)).ln() + 1.0)
            .collect();

        tokenized.iter().map(|tokens| self.weigh(tokens)).collect()
    }

    /// Vectorizes a document against the fitted vocabulary, ignoring unknown terms
    pub fn transform(&self, document: &str) -> SparseVector {
        self.weigh(&self.terms(document))
    }

    fn weigh(&self, tokens: &[String]) -> SparseVector {
        SparseVector::from_entries(
            tokens
                .iter()
                .filter_map(|t| self.term_index(t))
                .map(|index| (index, self.idf[index])),
        )
        .normalized()
    }
}

/// Ranks catalog rows against a query vector
///
/// The brute-force scan over [`VectorModel`] is the only implementation; an
/// approximate nearest-neighbor index can be dropped in behind this trait.
pub trait SimilarityIndex: Send + Sync {
    /// Every row as `(row, score)`, highest score first, ties in row order
    fn rank(&self, query: &SparseVector) -> Vec<(usize, f64)>;
}

/// TF-IDF model of the whole catalog
///
/// `ids[i]`, `books[i]` and `rows[i]` always describe the same book. Any
/// catalog change after the build requires a full rebuild.
#[derive(Debug, Clone, Default)]
pub struct VectorModel {
    ids: Vec<String>,
    books: Vec<BookSummary>,
    rows: Vec<SparseVector>,
    positions: HashMap<String, usize>,
    vocabulary_size: usize,
}

impl VectorModel {
    /// Builds the model from every book in catalog order
    pub fn build(books: Vec<BookSummary>) -> Self {
        if books.is_empty() {
            return Self::default();
        }

        let documents: Vec<String> = books.iter().map(BookSummary::document).collect();
        let mut vectorizer = TfidfVectorizer::new();
        let rows = vectorizer.fit_transform(&documents);

        let ids: Vec<String> = books.iter().map(|b| b.book_id.clone()).collect();
        let positions = ids
            .iter()
            .enumerate()
            .map(|(row, id)| (id.clone(), row))
            .collect();

        Self {
            ids,
            books,
            rows,
            positions,
            vocabulary_size: vectorizer.vocabulary_size(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn rows(&self) -> &[SparseVector] {
        &self.rows
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary_size
    }

    /// Row holding `book_id`, if the book was in the catalog at build time
    pub fn position(&self, book_id: &str) -> Option<usize> {
        self.positions.get(book_id).copied()
    }

    pub fn book(&self, row: usize) -> Option<&BookSummary> {
        self.books.get(row)
    }

    /// Mean of the given rows, `None` when `rows` is empty
    pub fn centroid(&self, rows: &[usize]) -> Option<SparseVector> {
        SparseVector::mean(rows.iter().filter_map(|&row| self.rows.get(row)))
    }
}

impl SimilarityIndex for VectorModel {
    fn rank(&self, query: &SparseVector) -> Vec<(usize, f64)> {
        let mut scored: Vec<(usize, f64)> = self
            .rows
            .iter()
            .enumerate()
            .map(|(row, vector)| (row, query.cosine(vector)))
            .collect();
        // sort_by is stable, equal scores keep row order
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Book;

    fn book(id: &str, title: &str) -> BookSummary {
        Book::new(id, title).summary(Vec::new())
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("Space-Opera, a NOVEL by X_Y 42"),
            vec!["space", "opera", "novel", "by", "x_y", "42"]
        );
    }

    #[test]
    fn test_stop_words_excluded_from_vocabulary() {
        let mut vectorizer = TfidfVectorizer::new();
        vectorizer.fit_transform(&["the cat and the hat"]);
        assert_eq!(vectorizer.vocabulary_size(), 2);
        assert!(vectorizer.term_index("the").is_none());
        assert!(vectorizer.term_index("cat").is_some());
    }

    #[test]
    fn test_rows_are_unit_length() {
        let mut vectorizer = TfidfVectorizer::new();
        let rows = vectorizer.fit_transform(&["space adventure", "space opera space", "cooking"]);
        for row in rows {
            assert!((row.norm() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_idf_favors_rare_terms() {
        let mut vectorizer = TfidfVectorizer::new();
        let rows = vectorizer.fit_transform(&["space adventure", "space opera"]);
        let space = vectorizer.term_index("space").unwrap();
        let adventure = vectorizer.term_index("adventure").unwrap();

        let weight = |index| {
            rows[0]
                .entries()
                .iter()
                .find(|(i, _)| *i == index)
                .map(|(_, w)| *w)
                .unwrap()
        };
        assert!(weight(adventure) > weight(space));
    }

    #[test]
    fn test_document_of_only_stop_words_is_zero_vector() {
        let mut vectorizer = TfidfVectorizer::new();
        let rows = vectorizer.fit_transform(&["the and of", "dragons"]);
        assert!(rows[0].is_empty());
        assert_eq!(rows[0].cosine(&rows[1]), 0.0);
    }

    #[test]
    fn test_transform_ignores_unknown_terms() {
        let mut vectorizer = TfidfVectorizer::new();
        vectorizer.fit_transform(&["space adventure"]);
        assert!(vectorizer.transform("cooking recipes").is_empty());
        assert!(!vectorizer.transform("space cooking").is_empty());
    }

    #[test]
    fn test_mean_of_vectors() {
        let a = SparseVector::from_entries([(0, 1.0), (2, 2.0)]);
        let b = SparseVector::from_entries([(2, 4.0), (3, 2.0)]);
        let mean = SparseVector::mean([&a, &b]).unwrap();
        assert_eq!(mean.entries(), &[(0, 0.5), (2, 3.0), (3, 1.0)]);
        assert!(SparseVector::mean(std::iter::empty()).is_none());
    }

    #[test]
    fn test_build_keeps_ids_aligned_with_rows() {
        let model = VectorModel::build(vec![
            book("A", "space adventure"),
            book("B", "space opera"),
            book("C", "cooking recipes"),
        ]);

        assert_eq!(model.len(), 3);
        assert_eq!(model.ids(), &["A", "B", "C"]);
        assert_eq!(model.rows().len(), model.ids().len());
        for (row, id) in model.ids().iter().enumerate() {
            assert_eq!(model.position(id), Some(row));
            assert_eq!(&model.book(row).unwrap().book_id, id);
        }
        assert_eq!(model.vocabulary_size(), 5);
    }

    #[test]
    fn test_empty_catalog_builds_empty_model() {
        let model = VectorModel::build(Vec::new());
        assert!(model.is_empty());
        assert_eq!(model.vocabulary_size(), 0);
        assert!(model.centroid(&[]).is_none());
        assert!(model.rank(&SparseVector::default()).is_empty());
    }

    #[test]
    fn test_rank_orders_by_similarity() {
        let model = VectorModel::build(vec![
            book("A", "space adventure"),
            book("B", "space opera"),
            book("C", "cooking recipes"),
        ]);
        let centroid = model.centroid(&[0]).unwrap();
        let ranked: Vec<usize> = model.rank(&centroid).into_iter().map(|(row, _)| row).collect();
        assert_eq!(ranked, vec![0, 1, 2]);
    }

    #[test]
    fn test_rank_ties_keep_row_order() {
        let model = VectorModel::build(vec![
            book("A", "dragons"),
            book("B", "baking"),
            book("C", "gardening"),
            book("D", "knitting"),
        ]);
        let centroid = model.centroid(&[0]).unwrap();
        let ranked: Vec<usize> = model.rank(&centroid).into_iter().map(|(row, _)| row).collect();
        assert_eq!(ranked, vec![0, 1, 2, 3]);
    }
}
