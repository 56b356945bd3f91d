//! Global and server-scoped blacklist/whitelist membership.
//!
//! The global lists are fixed at start-up (built-in sets extended by the
//! `lists` config section). Server-scoped lists mirror the `blacklist` and
//! `whitelist` tables and are updated by the admin commands.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::common::{ListKind, ServerId};
use crate::config::ListsConfig;

/// Two-letter tokens that are mostly abbreviations or interjections.
const TWO_LETTER_BLACKLIST: &[&str] = &[
    "aa", "ab", "ad", "ae", "ag", "ah", "ai", "al", "ar", "aw", "ba", "bi", "bo", "da", "de", "di",
    "ed", "ee", "ef", "eh", "el", "em", "en", "er", "es", "ew", "ex", "fa", "fe", "gi", "gu", "hm",
    "ho", "id", "jo", "ka", "ki", "la", "li", "lo", "mi", "mm", "mu", "na", "ne", "nu", "od", "oe",
    "oi", "ok", "om", "op", "os", "ow", "oy", "pa", "pe", "pi", "po", "qi", "re", "sh", "si", "ta",
    "te", "ti", "uh", "um", "un", "ut", "xi", "xu", "ya", "ye", "yo", "za",
];

/// Words refused at any length.
const BANNED_WORDS: &[&str] = &[
    "asshole", "bastard", "bitch", "cunt", "dickhead", "fuck", "fucking", "motherfucker", "shit",
    "twat", "wanker",
];

/// The only three-letter words the game accepts.
const THREE_LETTER_WHITELIST: &[&str] = &[
    "ace", "act", "add", "age", "ago", "aid", "aim", "air", "all", "and", "ant", "any", "ape", "apt",
    "arc", "are", "ark", "arm", "art", "ash", "ask", "ate", "awe", "axe", "bad", "bag", "ban", "bar",
    "bat", "bay", "bed", "bee", "beg", "bet", "bid", "big", "bin", "bit", "bow", "box", "boy", "bud",
    "bug", "bun", "bus", "but", "buy", "cab", "can", "cap", "car", "cow", "cry", "cub", "cup", "cut",
    "dad", "day", "den", "dew", "did", "die", "dig", "dim", "dip", "dog", "dot", "dry", "due", "dug",
    "dye", "ear", "eat", "egg", "ego", "elf", "elk", "elm", "end", "era", "eve", "eye", "fan", "far",
    "fat", "fee", "few", "fig", "fin", "fir", "fit", "fix", "fly", "foe", "fog", "for", "fox", "fry",
    "fun", "fur", "gap", "gas", "gel", "gem", "get", "gin", "god", "got", "gum", "gun", "gut", "guy",
    "gym", "had", "ham", "has", "hat", "hay", "hen", "her", "hid", "him", "hip", "his", "hit", "hog",
    "hop", "hot", "how", "hub", "hue", "hug", "hut", "ice", "icy", "ill", "ink", "inn", "ion", "its",
    "ivy", "jam", "jar", "jaw", "jet", "job", "jog", "joy", "jug", "key", "kid", "kin", "kit", "lab",
    "lad", "lap", "law", "lay", "leg", "let", "lid", "lie", "lip", "log", "lot", "low", "mad", "man",
    "map", "mat", "may", "men", "met", "mix", "mob", "mop", "mud", "mug", "nap", "net", "new", "nod",
    "nor", "not", "now", "nut", "oak", "oar", "oat", "odd", "off", "oil", "old", "one", "opt", "orb",
    "ore", "our", "out", "owe", "owl", "own", "pad", "pan", "paw", "pay", "pea", "pen", "pet", "pie",
    "pig", "pin", "pit", "pop", "pot", "pro", "pub", "pun", "pup", "put", "rag", "ram", "ran", "rat",
    "raw", "ray", "red", "rib", "rid", "rig", "rim", "rip", "rob", "rod", "rot", "row", "rub", "rug",
    "run", "rye", "sad", "sap", "sat", "saw", "say", "sea", "see", "set", "sew", "she", "shy", "sin",
    "sip", "sir", "sit", "six", "ski", "sky", "sly", "sob", "son", "soy", "spa", "spy", "sum", "sun",
    "tab", "tag", "tan", "tap", "tar", "tax", "tea", "ten", "the", "tie", "tin", "tip", "toe", "ton",
    "too", "top", "toy", "try", "tub", "tug", "two", "urn", "use", "van", "vat", "vet", "via", "vow",
    "wag", "war", "was", "wax", "way", "web", "wed", "wet", "who", "why", "wig", "win", "wit", "woe",
    "won", "wow", "yak", "yam", "yes", "yet", "you", "zap", "zip", "zoo",
];

/// Process-wide word lists.
#[derive(Debug, Clone)]
pub struct GlobalLists {
    two_letter_blacklist: HashSet<String>,
    banned_words: HashSet<String>,
    three_letter_whitelist: HashSet<String>,
}

impl GlobalLists {
    /// Built-in lists extended with the entries of the `lists` config section.
    pub fn new(extra: Option<&ListsConfig>) -> Self {
        let mut lists = Self::default();
        if let Some(extra) = extra {
            extend(&mut lists.two_letter_blacklist, &extra.two_letter_blacklist);
            extend(&mut lists.banned_words, &extra.banned_words);
            extend(&mut lists.three_letter_whitelist, &extra.three_letter_whitelist);
        }
        lists
    }

    /// Global verdict, used on its own when no server context exists.
    ///
    /// A three-letter word is blacklisted unless it is on the closed
    /// three-letter whitelist.
    pub fn is_blacklisted(&self, word: &str) -> bool {
        if self.two_letter_blacklist.contains(word) || self.banned_words.contains(word) {
            return true;
        }
        word.chars().count() == 3 && !self.three_letter_whitelist.contains(word)
    }
}

impl Default for GlobalLists {
    fn default() -> Self {
        Self {
            two_letter_blacklist: TWO_LETTER_BLACKLIST.iter().map(|w| w.to_string()).collect(),
            banned_words: BANNED_WORDS.iter().map(|w| w.to_string()).collect(),
            three_letter_whitelist: THREE_LETTER_WHITELIST.iter().map(|w| w.to_string()).collect(),
        }
    }
}

fn extend(set: &mut HashSet<String>, extra: &Option<Vec<String>>) {
    if let Some(words) = extra {
        set.extend(words.iter().map(|w| w.to_lowercase()));
    }
}

/// Entries of one server.
#[derive(Debug, Clone, Default)]
pub struct ScopeLists {
    pub blacklist: HashSet<String>,
    pub whitelist: HashSet<String>,
}

impl ScopeLists {
    fn entries_mut(&mut self, kind: ListKind) -> &mut HashSet<String> {
        match kind {
            ListKind::Blacklist => &mut self.blacklist,
            ListKind::Whitelist => &mut self.whitelist,
        }
    }

    fn entries(&self, kind: ListKind) -> &HashSet<String> {
        match kind {
            ListKind::Blacklist => &self.blacklist,
            ListKind::Whitelist => &self.whitelist,
        }
    }
}

/// Blacklist/whitelist lookups for the validation pipeline.
#[derive(Debug, Clone)]
pub struct ListFilter {
    global: Arc<GlobalLists>,
    scopes: HashMap<ServerId, ScopeLists>,
}

impl ListFilter {
    pub fn new(global: Arc<GlobalLists>) -> Self {
        Self {
            global,
            scopes: HashMap::new(),
        }
    }

    pub fn global(&self) -> &Arc<GlobalLists> {
        &self.global
    }

    /// Whether the word is whitelisted for the server.
    ///
    /// There is no global whitelist apart from the three-letter list, which
    /// only lifts the short-word rule and therefore lives in [`GlobalLists`].
    pub fn is_whitelisted(&self, word: &str, scope: Option<ServerId>) -> bool {
        scope
            .and_then(|server_id| self.scopes.get(&server_id))
            .is_some_and(|lists| lists.whitelist.contains(word))
    }

    /// Whether the word is blacklisted, globally or for the server.
    ///
    /// A scope whitelist entry overrides both.
    pub fn is_blacklisted(&self, word: &str, scope: Option<ServerId>) -> bool {
        if self.is_whitelisted(word, scope) {
            return false;
        }
        if self.global.is_blacklisted(word) {
            return true;
        }
        scope
            .and_then(|server_id| self.scopes.get(&server_id))
            .is_some_and(|lists| lists.blacklist.contains(word))
    }

    /// Replace all entries of a server, e.g. after loading them from storage.
    pub fn load_scope(&mut self, server_id: ServerId, lists: ScopeLists) {
        self.scopes.insert(server_id, lists);
    }

    pub fn insert(&mut self, server_id: ServerId, kind: ListKind, word: &str) -> bool {
        self.scopes
            .entry(server_id)
            .or_default()
            .entries_mut(kind)
            .insert(word.to_string())
    }

    pub fn remove(&mut self, server_id: ServerId, kind: ListKind, word: &str) -> bool {
        self.scopes
            .get_mut(&server_id)
            .is_some_and(|lists| lists.entries_mut(kind).remove(word))
    }

    /// Sorted entries of one list of a server.
    pub fn entries(&self, server_id: ServerId, kind: ListKind) -> Vec<String> {
        let mut words: Vec<String> = self
            .scopes
            .get(&server_id)
            .map(|lists| lists.entries(kind).iter().cloned().collect())
            .unwrap_or_default();
        words.sort();
        words
    }

    pub fn drop_scope(&mut self, server_id: ServerId) {
        self.scopes.remove(&server_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_filter() -> ListFilter {
        let mut filter = ListFilter::new(Arc::new(GlobalLists::default()));
        filter.insert(1, ListKind::Blacklist, "banana");
        filter.insert(1, ListKind::Whitelist, "cat");
        filter.insert(1, ListKind::Whitelist, "ok");
        filter
    }

    #[test]
    fn test_two_letter_blacklist() {
        let filter = make_filter();
        assert!(filter.is_blacklisted("ok", None));
        assert!(filter.is_blacklisted("ok", Some(2)));
        assert!(!filter.is_blacklisted("zz", None));
    }

    #[test]
    fn test_three_letter_closed_list() {
        let filter = make_filter();
        assert!(filter.is_blacklisted("cat", None));
        assert!(filter.is_blacklisted("cat", Some(2)));
        assert!(!filter.is_blacklisted("dog", None));
        assert!(!filter.is_blacklisted("apple", None));
    }

    #[test]
    fn test_banned_words_any_length() {
        let filter = make_filter();
        assert!(filter.is_blacklisted("bastard", Some(2)));
        assert!(filter.is_blacklisted("shit", None));
    }

    #[test]
    fn test_scope_whitelist_overrides_global() {
        let filter = make_filter();
        assert!(filter.is_whitelisted("cat", Some(1)));
        assert!(!filter.is_blacklisted("cat", Some(1)));
        assert!(!filter.is_blacklisted("ok", Some(1)));
    }

    #[test]
    fn test_scope_blacklist_only_with_scope() {
        let filter = make_filter();
        assert!(filter.is_blacklisted("banana", Some(1)));
        assert!(!filter.is_blacklisted("banana", Some(2)));
        assert!(!filter.is_blacklisted("banana", None));
    }

    #[test]
    fn test_whitelist_requires_scope() {
        let filter = make_filter();
        assert!(!filter.is_whitelisted("cat", None));
        assert!(!filter.is_whitelisted("cat", Some(2)));
    }

    #[test]
    fn test_insert_remove_entries() {
        let mut filter = make_filter();
        assert!(filter.insert(1, ListKind::Blacklist, "apple"));
        assert!(!filter.insert(1, ListKind::Blacklist, "apple"));
        assert_eq!(filter.entries(1, ListKind::Blacklist), vec!["apple", "banana"]);

        assert!(filter.remove(1, ListKind::Blacklist, "apple"));
        assert!(!filter.remove(1, ListKind::Blacklist, "apple"));
        assert!(!filter.remove(9, ListKind::Blacklist, "apple"));

        filter.drop_scope(1);
        assert!(filter.entries(1, ListKind::Whitelist).is_empty());
    }

    #[test]
    fn test_config_extends_global_lists() {
        let extra = ListsConfig {
            two_letter_blacklist: Some(vec!["zz".to_string()]),
            banned_words: Some(vec!["Frack".to_string()]),
            three_letter_whitelist: Some(vec!["cat".to_string()]),
        };
        let global = GlobalLists::new(Some(&extra));
        assert!(global.is_blacklisted("zz"));
        assert!(global.is_blacklisted("frack"));
        assert!(!global.is_blacklisted("cat"));
    }
}
