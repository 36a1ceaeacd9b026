//! Offline fact lookup for the orchestrator's `FACTS_TO_LOOKUP` items.

use async_trait::async_trait;

/// Broad subject of a lookup query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject {
    Geometry,
    Algebra,
    Arithmetic,
    General,
}

impl Subject {
    /// Classify `query` by keyword.
    pub fn classify(query: &str) -> Self {
        let q = query.to_lowercase();
        let any = |words: &[&str]| words.iter().any(|w| q.contains(w));
        if any(&[
            "area", "perimeter", "angle", "triangle", "circle", "square", "rectangle", "volume",
            "radius", "面積", "正方形", "円", "三角形",
        ]) {
            Self::Geometry
        } else if any(&["equation", "solve for", "variable", "unknown x", "x =", "方程式", "変数"]) {
            Self::Algebra
        } else if any(&[
            "sum", "total", "difference", "product", "percent", "half", "twice", "calculate",
            "計算", "合計",
        ]) {
            Self::Arithmetic
        } else {
            Self::General
        }
    }

    fn facts(self) -> &'static [&'static str] {
        match self {
            Self::Geometry => &[
                "Area of a rectangle = length x width",
                "Area of a square = side^2",
                "Area of a circle = pi x r^2",
                "Perimeter of a rectangle = 2 x (length + width)",
            ],
            Self::Algebra => &[
                "Isolate the unknown by applying the same operation to both sides",
                "Linear equation ax + b = c has solution x = (c - b) / a",
            ],
            Self::Arithmetic => &[
                "Half of a quantity is the quantity divided by 2",
                "A total is the sum of its parts",
                "p percent of n is n x p / 100",
            ],
            Self::General => &["Restate the problem, list the known quantities and check units"],
        }
    }
}

/// Resolves a query to reference text.
#[async_trait]
pub trait FactLookup: Send + Sync {
    async fn lookup(&self, query: &str) -> String;
}

/// Keyword-classified reference facts, no network access.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordLookup;

#[async_trait]
impl FactLookup for KeywordLookup {
    async fn lookup(&self, query: &str) -> String {
        let subject = Subject::classify(query);
        let mut out = format!("Search results: {}", query.trim());
        for fact in subject.facts() {
            out.push_str("\n- ");
            out.push_str(fact);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(Subject::classify("正方形の面積"), Subject::Geometry);
        assert_eq!(Subject::classify("方程式を解く"), Subject::Algebra);
        assert_eq!(Subject::classify("計算問題"), Subject::Arithmetic);
        assert_eq!(Subject::classify("unknown problem"), Subject::General);
    }

    #[tokio::test]
    async fn test_lookup_has_results_header() {
        let result = KeywordLookup.lookup("area formula for a rectangle").await;
        assert!(result.starts_with("Search results:"));
        assert!(result.contains("length x width"));
    }
}
