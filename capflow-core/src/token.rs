//! Token registry.
//!
//! Protocol ids, property ids, tags and payload types are all interned
//! strings. Interning happens once, after which every comparison on the hot
//! path is a `u32` compare. The registry is owned by a session and shared
//! with its pools through an `Arc`.

use std::collections::HashMap;
use std::fmt;

use compact_str::CompactString;
use parking_lot::RwLock;

/// Interned identifier.
///
/// Equal tokens always denote equal strings for the lifetime of the registry
/// that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Token(u32);

impl Token {
    /// Reserved token for the empty string.
    pub const NULL: Token = Token(0);

    /// Raw numeric id.
    pub fn id(self) -> u32 {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Tokens the engine itself relies on, interned by [`TokenRegistry::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WellKnown {
    /// Payload type carrying in-order stream bytes (`@reassembled`)
    pub reassembled: Token,
    /// Tag and property marking a failed dissector (`@error`)
    pub error: Token,
    /// Payload type carrying undecoded bytes (`@data`)
    pub data: Token,
    /// Source address or port property (`.src`)
    pub src: Token,
    /// Destination address or port property (`.dst`)
    pub dst: Token,
}

#[derive(Default)]
struct Interner {
    ids: HashMap<CompactString, Token>,
    names: Vec<CompactString>,
}

impl Interner {
    fn intern(&mut self, name: &str) -> Token {
        if let Some(token) = self.ids.get(name) {
            return *token;
        }
        let token = Token(self.names.len() as u32);
        self.names.push(CompactString::from(name));
        self.ids.insert(CompactString::from(name), token);
        token
    }
}

/// Thread-safe string interner.
pub struct TokenRegistry {
    inner: RwLock<Interner>,
    well_known: WellKnown,
}

impl TokenRegistry {
    pub fn new() -> Self {
        let mut interner = Interner::default();
        interner.intern("");

        let well_known = WellKnown {
            reassembled: interner.intern("@reassembled"),
            error: interner.intern("@error"),
            data: interner.intern("@data"),
            src: interner.intern(".src"),
            dst: interner.intern(".dst"),
        };

        Self {
            inner: RwLock::new(interner),
            well_known,
        }
    }

    /// Intern `name`, returning the same token for the same string.
    pub fn get(&self, name: &str) -> Token {
        let existing = self.inner.read().ids.get(name).copied();
        match existing {
            Some(token) => token,
            None => self.inner.write().intern(name),
        }
    }

    /// Look up `name` without interning it.
    pub fn lookup(&self, name: &str) -> Option<Token> {
        self.inner.read().ids.get(name).copied()
    }

    /// Reverse lookup.
    pub fn string(&self, token: Token) -> Option<CompactString> {
        self.inner.read().names.get(token.0 as usize).cloned()
    }

    /// Intern the concatenation of two token names, e.g. `http` + `.path`.
    pub fn join(&self, prefix: Token, suffix: Token) -> Token {
        let joined = {
            let inner = self.inner.read();
            let (Some(a), Some(b)) = (
                inner.names.get(prefix.0 as usize),
                inner.names.get(suffix.0 as usize),
            ) else {
                return Token::NULL;
            };
            let mut joined = a.clone();
            joined.push_str(b);
            joined
        };
        self.get(&joined)
    }

    /// Number of interned strings, including the empty string.
    pub fn len(&self) -> usize {
        self.inner.read().names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn well_known(&self) -> &WellKnown {
        &self.well_known
    }
}

impl Default for TokenRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TokenRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRegistry")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_get_is_idempotent() {
        let tokens = TokenRegistry::new();
        let a = tokens.get("http");
        let b = tokens.get("http");
        assert_eq!(a, b);
        assert_ne!(a, tokens.get("tcp"));
        assert_eq!(tokens.string(a).as_deref(), Some("http"));
    }

    #[test]
    fn test_empty_string_is_null() {
        let tokens = TokenRegistry::new();
        assert_eq!(tokens.get(""), Token::NULL);
        assert!(Token::NULL.is_null());
    }

    #[test]
    fn test_well_known_preinterned() {
        let tokens = TokenRegistry::new();
        let wk = *tokens.well_known();
        assert_eq!(tokens.get("@reassembled"), wk.reassembled);
        assert_eq!(tokens.get(".src"), wk.src);
        assert_eq!(tokens.lookup("@error"), Some(wk.error));
        assert_eq!(tokens.lookup("never-seen"), None);
    }

    #[test]
    fn test_join() {
        let tokens = TokenRegistry::new();
        let http = tokens.get("http");
        let path = tokens.get(".path");
        let joined = tokens.join(http, path);
        assert_eq!(tokens.string(joined).as_deref(), Some("http.path"));
        assert_eq!(joined, tokens.get("http.path"));
    }

    #[test]
    fn test_concurrent_interning_agrees() {
        let tokens = Arc::new(TokenRegistry::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let tokens = Arc::clone(&tokens);
                thread::spawn(move || {
                    (0..100)
                        .map(|i| tokens.get(&format!("name-{i}")))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for other in &results[1..] {
            assert_eq!(&results[0], other);
        }
        // "" + five well-known + 100 names
        assert_eq!(tokens.len(), 106);
    }
}
