mod term;

pub use term::InvalidTerm;
pub use term::RdfLiteral;
pub use term::RdfTerm;
pub use term::TermKind;
