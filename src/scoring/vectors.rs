// src/scoring/vectors.rs - Hashed bag-of-words vectors and style references

use std::collections::HashMap;

/// Dimension of every prompt and reference vector.
pub const VECTOR_DIM: usize = 50;

/// A fixed-size, unit-length embedding.
pub type StyleVector = [f32; VECTOR_DIM];

/// 32-bit rolling string hash (`h = h * 31 + unit`, wrapping) over UTF-16 code
/// units, returned as an absolute value. Stable across processes, so reference
/// vectors come out identical on every start.
pub fn hash_token(token: &str) -> u64 {
    let mut hash: i32 = 0;
    for unit in token.encode_utf16() {
        hash = (hash << 5).wrapping_sub(hash).wrapping_add(unit as i32);
    }
    (hash as i64).unsigned_abs()
}

fn bucket(token: &str) -> usize {
    (hash_token(token) % VECTOR_DIM as u64) as usize
}

/// Normalize a vector to unit length. Zero vectors are left unchanged.
pub fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Dot product. For unit vectors this is the cosine similarity.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Cosine similarity for vectors of any length or norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot(a, b) / (norm_a * norm_b)
}

/// Turn a prompt into a term-frequency vector: lower-case, split on
/// whitespace, one increment per token in its hash bucket, then normalize.
pub fn prompt_vector(prompt: &str) -> StyleVector {
    let mut v = [0.0f32; VECTOR_DIM];
    for word in prompt.split_whitespace() {
        v[bucket(&word.to_lowercase())] += 1.0;
    }
    normalize(&mut v);
    v
}

/// Build a reference vector from keywords. Each keyword marks its bucket with
/// 1 (no accumulation), then the vector is normalized.
pub fn keyword_vector(keywords: &[&str]) -> StyleVector {
    let mut v = [0.0f32; VECTOR_DIM];
    for keyword in keywords {
        v[bucket(&keyword.to_lowercase())] = 1.0;
    }
    normalize(&mut v);
    v
}

const WIZARD_KEYWORDS: &[&str] = &[
    "magical", "mystical", "staff", "ethereal", "ancient", "symbols", "glow",
];
const COSMIC_KEYWORDS: &[&str] = &[
    "space", "stars", "nebula", "galaxy", "cosmic", "celestial", "universe",
];
const CYBER_KEYWORDS: &[&str] = &[
    "neon", "digital", "cyber", "tech", "futuristic", "circuit", "chrome",
];

/// Per-style reference vectors. Built once, then only read.
#[derive(Debug, Clone)]
pub struct ReferenceVectors {
    vectors: HashMap<String, StyleVector>,
}

impl Default for ReferenceVectors {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ReferenceVectors {
    pub fn empty() -> Self {
        Self {
            vectors: HashMap::new(),
        }
    }

    /// The wizard / cosmic / cyber references.
    pub fn builtin() -> Self {
        let mut refs = Self::empty();
        refs.insert("wizard", WIZARD_KEYWORDS);
        refs.insert("cosmic", COSMIC_KEYWORDS);
        refs.insert("cyber", CYBER_KEYWORDS);
        refs
    }

    /// Add (or replace) a style built from its keyword list.
    pub fn insert(&mut self, style: impl Into<String>, keywords: &[&str]) {
        self.vectors.insert(style.into(), keyword_vector(keywords));
    }

    pub fn get(&self, style: &str) -> Option<&StyleVector> {
        self.vectors.get(style)
    }

    pub fn styles(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.vectors.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}
