//! Channel mode string parsing.
//!
//! Mode changes from the server are applied best-effort: a letter that
//! wants an argument but finds none gets `None` rather than an error.

/// One `+x` or `-x` with its argument, if it consumed one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModeChange {
    pub grant: bool,
    pub letter: char,
    pub arg: Option<String>,
}

enum PlusMinus {
    Plus,
    Minus,
}

/// Whether `letter` consumes an argument in the given direction.
///
/// Prefix modes (`qaohv`), list modes (`beI`) and the key (`k`) always do;
/// limit-like modes (`lLjf`) only when set.
pub fn takes_arg(letter: char, grant: bool) -> bool {
    match letter {
        'q' | 'a' | 'o' | 'h' | 'v' => true,
        'b' | 'e' | 'I' | 'k' => true,
        'l' | 'L' | 'j' | 'f' => grant,
        _ => false,
    }
}

/// Parse a mode string like `+ov-b` against its argument list.
pub fn parse_channel_modes(modes: &str, args: &[&str]) -> Vec<ModeChange> {
    use self::PlusMinus::*;

    let mut res = vec![];
    let mut args = args.iter().copied();
    let mut cur_mod = Plus;

    for c in modes.chars() {
        match c {
            '+' => cur_mod = Plus,
            '-' => cur_mod = Minus,
            _ => {
                let grant = matches!(cur_mod, Plus);
                let arg = if takes_arg(c, grant) {
                    args.next().map(str::to_string)
                } else {
                    None
                };
                res.push(ModeChange {
                    grant,
                    letter: c,
                    arg,
                });
            }
        }
    }

    res
}
