/// Text filter for the function list.
///
/// The pattern is a comma-separated list of case-insensitive substrings.
/// `""` passes everything, `"a,b"` passes text containing `a` or `b`, and
/// `"-a"` rejects text containing `a`. Terms are tried in order and the
/// first one that matches decides; text matching no term passes only when
/// the pattern has no inclusive term.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionFilter {
    terms: Vec<Term>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Term {
    Include(String),
    Exclude(String),
}

impl FunctionFilter {
    pub fn new(pattern: &str) -> Self {
        let terms = pattern
            .split(',')
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .filter_map(|term| match term.strip_prefix('-') {
                Some(excluded) if excluded.trim().is_empty() => None,
                Some(excluded) => Some(Term::Exclude(excluded.trim().to_lowercase())),
                None => Some(Term::Include(term.to_lowercase())),
            })
            .collect();
        Self { terms }
    }

    pub fn is_active(&self) -> bool {
        !self.terms.is_empty()
    }

    pub fn passes(&self, text: &str) -> bool {
        if self.terms.is_empty() {
            return true;
        }
        let text = text.to_lowercase();
        for term in &self.terms {
            match term {
                Term::Exclude(needle) if text.contains(needle.as_str()) => return false,
                Term::Include(needle) if text.contains(needle.as_str()) => return true,
                _ => {}
            }
        }
        !self.terms.iter().any(|term| matches!(term, Term::Include(_)))
    }
}
