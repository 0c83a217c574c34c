mod line;
mod nom_parser;

pub use self::line::{decode_line, split_prefix, ParsedLine};
pub use self::nom_parser::{parse_line, RawLine};
