/// Header overrides supplied by the caller. Combined with what the keyspec
/// parser saw in the first row, this decides whether row one is column names.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeaderPolicy {
    /// Treat the first row as data no matter what. Wins over everything.
    pub no_header: bool,
    /// Treat the first row as a header even if no selector matched a name.
    pub force_header: bool,
}

impl HeaderPolicy {
    pub fn new(no_header: bool, force_header: bool) -> Self {
        Self { no_header, force_header }
    }

    /// Same policy with `force_header` switched on when `yes` is set.
    /// Used by commands whose own arguments imply a header (e.g. labels).
    pub fn forcing(self, yes: bool) -> Self {
        Self { force_header: self.force_header || yes, ..self }
    }

    /// `detected` is the keyspec parser's name-match evidence.
    pub fn resolve(&self, detected: bool) -> bool {
        !self.no_header && (self.force_header || detected)
    }
}
