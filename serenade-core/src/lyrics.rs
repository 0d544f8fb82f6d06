/// Built-in lyrics used whenever the content source cannot deliver any.
pub const DEFAULT_LYRICS: &[&str] = &[
    "In the neighborhood, I see my reflection",
    "Walking down the street, lost in my direction",
    "Every window shows a different me",
    "Wondering who I really want to be",
    "In the mirror of my mind",
    "I search for what I cannot find",
    "Reflections of the past",
    "Memories that always last",
    "In this neighborhood of dreams",
    "Nothing is quite what it seems",
    "I see myself in every face",
    "Trying to find my own place",
    "Reflection, reflection",
    "Show me my true direction",
    "In this neighborhood we call home",
    "I walk these streets alone",
];

/// Ordered lyric lines for one song.
///
/// Empty or whitespace-only lines are silence gaps: they keep their index
/// but never get a display slot of their own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LyricSheet {
    lines: Vec<String>,
}

/// Where a sheet's lines came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LyricsOrigin {
    /// Delivered by the content source
    Remote,
    /// Built-in default lines substituted after a fetch failure
    Fallback,
}

impl LyricSheet {
    /// Create a sheet from any list of lines
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    /// The built-in default sheet
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(DEFAULT_LYRICS.iter().copied())
    }

    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Text at `index`, if the index is in range
    #[must_use]
    pub fn line(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    /// Whether the line at `index` is a silence gap
    #[must_use]
    pub fn is_gap(&self, index: usize) -> bool {
        self.lines.get(index).is_some_and(|l| l.trim().is_empty())
    }

    /// Indices of all displayable (non-empty) lines, ascending
    pub fn displayable_indices(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.lines.len()).filter(|&i| !self.is_gap(i))
    }

    /// Number of displayable lines
    #[must_use]
    pub fn displayable_count(&self) -> usize {
        self.displayable_indices().count()
    }

    /// Whether at least one line can be shown
    #[must_use]
    pub fn has_displayable(&self) -> bool {
        self.displayable_indices().next().is_some()
    }

    /// First displayable index
    #[must_use]
    pub fn first_displayable(&self) -> Option<usize> {
        self.displayable_indices().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet_with_gaps() -> LyricSheet {
        LyricSheet::new(["first", "", "second", "   ", "third"])
    }

    #[test]
    fn test_builtin_sheet() {
        let sheet = LyricSheet::builtin();
        assert_eq!(sheet.len(), DEFAULT_LYRICS.len());
        assert_eq!(sheet.displayable_count(), DEFAULT_LYRICS.len());
        assert_eq!(sheet.first_displayable(), Some(0));
    }

    #[test]
    fn test_gaps_keep_positions() {
        let sheet = sheet_with_gaps();
        assert_eq!(sheet.len(), 5);
        assert_eq!(sheet.line(2), Some("second"));
        assert!(sheet.is_gap(1));
        assert!(sheet.is_gap(3));
        assert!(!sheet.is_gap(4));
        assert!(!sheet.is_gap(99));
    }

    #[test]
    fn test_displayable_indices_skip_gaps() {
        let sheet = sheet_with_gaps();
        let indices: Vec<_> = sheet.displayable_indices().collect();
        assert_eq!(indices, vec![0, 2, 4]);
        assert_eq!(sheet.displayable_count(), 3);
    }

    #[test]
    fn test_leading_gap() {
        let sheet = LyricSheet::new(["", "only"]);
        assert_eq!(sheet.first_displayable(), Some(1));
        assert!(sheet.has_displayable());
    }

    #[test]
    fn test_all_gaps() {
        let sheet = LyricSheet::new(["", " "]);
        assert!(!sheet.is_empty());
        assert!(!sheet.has_displayable());
        assert_eq!(sheet.first_displayable(), None);
    }
}
