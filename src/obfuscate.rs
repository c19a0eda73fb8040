//! Secret obfuscation for shipped JavaScript
//!
//! [`obfuscate`] turns a string into a JavaScript expression that evaluates
//! back to the same string while the string itself never appears in the
//! expression text. Lowercase ASCII letters and the newline are encoded
//! with expressions made only of `![]+(){}`; every other character
//! (digits, punctuation, uppercase, non-ASCII) is emitted as a quoted
//! literal and stays readable.
//!
//! This defeats grep-style scanning of a bundle. It is not encryption:
//! anyone able to run the artifact can evaluate the expression.
//!
//! ## Building blocks
//!
//! | expression         | value                                   |
//! |--------------------|-----------------------------------------|
//! | `![]+[]`           | `"false"`                               |
//! | `!![]+[]`          | `"true"`                                |
//! | `[][[]]+[]`        | `"undefined"`                           |
//! | `[]+{}`            | `"[object Object]"`                     |
//! | `[]+([]+[])[C]`    | `"function String() { [native code] }"` |
//! | `[]+(+[])[C]`      | `"function Number() { [native code] }"` |
//! | `[]+[][F][C]()`    | `"function anonymous(\n) {\n\n}"`       |
//!
//! where `C` spells `"constructor"` and `F` spells `"fill"`. Letters not
//! found in these strings come from `n.toString(36)`.

use crate::config::SecretsConfig;
use crate::error::{ReleaseError, ReleaseResult};
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

const FALSE: &str = "![]+[]";
const TRUE: &str = "!![]+[]";
const UNDEFINED: &str = "[][[]]+[]";
const OBJECT: &str = "[]+{}";

/// Expression evaluating to the empty string
const EMPTY_STRING: &str = "[]+[]";

/// Number built from `+[]` and summed `!![]`; two or more digits are
/// concatenated as strings and converted back with unary plus.
fn number(n: u32) -> String {
    match n {
        0 => "+[]".to_string(),
        1 => "+!![]".to_string(),
        2..=9 => vec!["!![]"; n as usize].join("+"),
        _ => {
            let digits: Vec<u32> = n
                .to_string()
                .chars()
                .filter_map(|c| c.to_digit(10))
                .collect();
            let mut expr = number(digits[0]);
            for digit in &digits[1..] {
                expr.push_str("+[");
                expr.push_str(&number(*digit));
                expr.push(']');
            }
            format!("+({})", expr)
        }
    }
}

fn pick(source: &str, index: u32) -> String {
    format!("({})[{}]", source, number(index))
}

/// Letters available from primitive coercions alone
fn primitive_letter(c: char) -> Option<String> {
    let (source, index) = match c {
        'a' => (FALSE, 1),
        'b' => (OBJECT, 2),
        'c' => (OBJECT, 5),
        'd' => (UNDEFINED, 2),
        'e' => (TRUE, 3),
        'f' => (FALSE, 0),
        'i' => (UNDEFINED, 5),
        'j' => (OBJECT, 3),
        'l' => (FALSE, 2),
        'n' => (UNDEFINED, 1),
        'o' => (OBJECT, 1),
        'r' => (TRUE, 1),
        's' => (FALSE, 3),
        't' => (TRUE, 0),
        'u' => (TRUE, 2),
        _ => return None,
    };
    Some(pick(source, index))
}

fn primitive_word(word: &str) -> String {
    word.chars()
        .filter_map(primitive_letter)
        .collect::<Vec<_>>()
        .join("+")
}

fn build_table() -> HashMap<char, String> {
    let constructor = primitive_word("constructor");
    let fill = primitive_word("fill");
    let string_source = format!("[]+([]+[])[{}]", constructor);
    let number_source = format!("[]+(+[])[{}]", constructor);
    let anonymous_source = format!("[]+[][{}][{}]()", fill, constructor);

    let to_string = [
        primitive_word("to"),
        pick(&string_source, 9),
        primitive_word("trin"),
        pick(&string_source, 14),
    ]
    .join("+");
    let radix = |n: u32| format!("({})[{}]({})", number(n), to_string, number(36));

    let mut table: HashMap<char, String> = ('a'..='z')
        .filter_map(|c| primitive_letter(c).map(|expr| (c, expr)))
        .collect();

    table.insert('g', pick(&string_source, 14));
    table.insert('m', pick(&number_source, 11));
    for (c, n) in [
        ('h', 17),
        ('k', 20),
        ('p', 25),
        ('q', 26),
        ('v', 31),
        ('w', 32),
        ('x', 33),
        ('y', 34),
        ('z', 35),
    ] {
        table.insert(c, radix(n));
    }
    table.insert('\n', pick(&anonymous_source, 19));
    table
}

fn table() -> &'static HashMap<char, String> {
    static TABLE: OnceLock<HashMap<char, String>> = OnceLock::new();
    TABLE.get_or_init(build_table)
}

/// Whether `c` is encoded without appearing literally
pub fn is_covered(c: char) -> bool {
    table().contains_key(&c)
}

fn quoted(c: char) -> String {
    format!("\"{}\"", c.escape_default())
}

/// Convert `secret` into a self-evaluating JavaScript expression
///
/// The result is parenthesised so it can replace any expression in place.
pub fn obfuscate(secret: &str) -> String {
    if secret.is_empty() {
        return format!("({})", EMPTY_STRING);
    }

    let table = table();
    let parts: Vec<String> = secret
        .chars()
        .map(|c| table.get(&c).cloned().unwrap_or_else(|| quoted(c)))
        .collect();
    format!("({})", parts.join("+"))
}

/// A named secret value and its obfuscated form
#[derive(Clone)]
pub struct SecretToken {
    name: String,
    raw: String,
    obfuscated: String,
}

impl SecretToken {
    pub fn new(name: impl Into<String>, raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let obfuscated = obfuscate(&raw);
        Self {
            name: name.into(),
            raw,
            obfuscated,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn obfuscated(&self) -> &str {
        &self.obfuscated
    }

    /// The value as a double-quoted string literal, the form bundlers inline
    pub fn literal(&self) -> String {
        serde_json::Value::String(self.raw.clone()).to_string()
    }

    /// Whether the raw value still occurs in `text`
    pub fn appears_in(&self, text: &str) -> bool {
        !self.raw.is_empty() && text.contains(&self.raw)
    }

    /// Characters of the value that remain readable after obfuscation
    pub fn uncovered_chars(&self) -> Vec<char> {
        let mut chars: Vec<char> = self.raw.chars().filter(|c| !is_covered(*c)).collect();
        chars.sort_unstable();
        chars.dedup();
        chars
    }
}

impl fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretToken")
            .field("name", &self.name)
            .field("raw", &"<redacted>")
            .field("obfuscated_len", &self.obfuscated.len())
            .finish()
    }
}

/// Derive tokens for every configured secret
///
/// Fails when a declared secret has no value in the environment.
pub fn tokens(secrets: &SecretsConfig) -> ReleaseResult<Vec<SecretToken>> {
    secrets
        .names
        .iter()
        .map(|name| match secrets.values.get(name) {
            Some(value) => Ok(SecretToken::new(name.clone(), value.clone())),
            None => Err(ReleaseError::Config(format!(
                "Secret '{}' is declared but has no value in the environment",
                name
            ))),
        })
        .collect()
}
