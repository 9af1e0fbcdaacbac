//! Script source aggregation.
//!
//! Text arrives one fragment at a time (typically one line per pipeline
//! input).  [`ScriptSource`] keeps the fragments in arrival order and joins
//! them into a single source string when the input ends.

/// One piece of incoming script text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Line(String),
    Chars(Vec<char>),
}

impl Fragment {
    /// Materialize the fragment as a string, keeping character order.
    pub fn into_string(self) -> String {
        match self {
            Fragment::Line(s) => s,
            Fragment::Chars(cs) => cs.into_iter().collect(),
        }
    }
}

impl From<&str> for Fragment {
    fn from(s: &str) -> Self {
        Fragment::Line(s.to_owned())
    }
}

impl From<String> for Fragment {
    fn from(s: String) -> Self {
        Fragment::Line(s)
    }
}

impl From<Vec<char>> for Fragment {
    fn from(cs: Vec<char>) -> Self {
        Fragment::Chars(cs)
    }
}

impl From<&[char]> for Fragment {
    fn from(cs: &[char]) -> Self {
        Fragment::Chars(cs.to_vec())
    }
}

/// Ordered buffer of script lines awaiting compilation.
#[derive(Debug, Clone, Default)]
pub struct ScriptSource {
    lines: Vec<String>,
}

impl ScriptSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, fragment: impl Into<Fragment>) {
        self.lines.push(fragment.into().into_string());
    }

    /// Number of fragments buffered since the last [`finalize`](Self::finalize).
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Take the buffered text as one source string and clear the buffer.
    ///
    /// A single fragment is returned verbatim; several are joined with `\n`
    /// and no trailing separator.
    pub fn finalize(&mut self) -> String {
        let mut lines = std::mem::take(&mut self.lines);
        match lines.len() {
            0 => String::new(),
            1 => lines.swap_remove(0),
            _ => lines.join("\n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_finalizes_to_empty_string() {
        assert_eq!(ScriptSource::new().finalize(), "");
    }

    #[test]
    fn single_fragment_is_verbatim() {
        let mut src = ScriptSource::new();
        src.append("line with trailing space \n");
        assert_eq!(src.finalize(), "line with trailing space \n");
    }

    #[test]
    fn many_fragments_join_in_order() {
        let mut src = ScriptSource::new();
        src.append("a");
        src.append(String::from("b"));
        src.append(vec!['c', 'd']);
        assert_eq!(src.len(), 3);
        assert_eq!(src.finalize(), "a\nb\ncd");
    }

    #[test]
    fn char_fragments_keep_order() {
        let chars: &[char] = &['h', 'é', 'y'];
        assert_eq!(Fragment::from(chars).into_string(), "héy");
    }

    #[test]
    fn finalize_clears_the_buffer() {
        let mut src = ScriptSource::new();
        src.append("x");
        src.append("y");
        assert_eq!(src.finalize(), "x\ny");
        assert!(src.is_empty());
        assert_eq!(src.finalize(), "");
    }

    #[test]
    fn empty_fragments_still_count() {
        let mut src = ScriptSource::new();
        for _ in 0..3 {
            src.append("");
        }
        assert_eq!(src.len(), 3);
        assert_eq!(src.finalize(), "\n\n");
    }
}
