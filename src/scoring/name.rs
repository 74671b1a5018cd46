//! Name normalization and similarity.
//!
//! Layout names are noisy: version prefixes (`01.02grp `), separators,
//! filler words and abbreviations. Everything here is symmetric so that
//! `name_similarity(a, b) == name_similarity(b, a)`.

use std::collections::BTreeSet;

const EXACT_MATCH: f64 = 1.0;
const BASE_MATCH: f64 = 0.85;
const SUBSTRING_BONUS: f64 = 0.15;
const KEYWORD_BONUS: f64 = 0.2;
pub(crate) const ALIAS_BONUS: f64 = 0.3;

/// Words that carry no identity in a layout name.
const NOISE_WORDS: &[&str] = &["all", "group", "grp", "my", "the", "model", "mod"];

/// Canonical prop words. Sharing one earns a bonus on top of token overlap.
const PROP_KEYWORDS: &[&str] = &[
    "arch", "tree", "megatree", "star", "spinner", "showstopper", "wreath", "snowflake",
    "candycane", "pumpkin", "matrix", "window", "door", "roof", "outline", "icicle", "flood",
    "bulb", "fence", "pole", "bush", "present", "santa", "snowman", "reindeer", "ghost", "bat",
    "tombstone", "spider", "face", "cross", "angel", "eave", "garage", "peak", "ring", "globe",
    "lollipop", "sign", "tune", "column",
];

/// Two-token spellings that collapse into one canonical token.
const COMPOUNDS: &[(&str, &str, &str)] = &[
    ("mega", "tree", "megatree"),
    ("candy", "cane", "candycane"),
    ("snow", "flake", "snowflake"),
    ("snow", "man", "snowman"),
    ("show", "stopper", "showstopper"),
    ("tomb", "stone", "tombstone"),
];

fn canonical(token: &str) -> &str {
    match token {
        "l" | "lft" => "left",
        "r" | "rt" | "rgt" => "right",
        "c" | "ctr" | "cntr" | "centre" => "center",
        "lg" | "big" | "lrg" => "large",
        "sm" | "mini" | "sml" => "small",
        "med" => "medium",
        "arches" => "arch",
        "trees" => "tree",
        "stars" => "star",
        "spinners" => "spinner",
        "ss" | "showstoppers" => "showstopper",
        "mt" | "megatrees" => "megatree",
        "calabaza" | "pumpkins" => "pumpkin",
        "canes" => "cane",
        "candycanes" => "candycane",
        "flake" | "flakes" | "snowflakes" => "snowflake",
        "windows" => "window",
        "doors" => "door",
        "mtx" | "matrices" | "matrixes" => "matrix",
        "wreaths" => "wreath",
        "icicles" => "icicle",
        "floods" | "floodlight" | "floodlights" => "flood",
        "outlines" => "outline",
        "bushes" | "shrub" | "shrubs" => "bush",
        "presents" | "gift" | "gifts" => "present",
        "bulbs" => "bulb",
        "poles" => "pole",
        "rings" => "ring",
        "globes" => "globe",
        "lollipops" => "lollipop",
        "peaks" => "peak",
        "eaves" => "eave",
        "vert" => "vertical",
        "horiz" => "horizontal",
        "ghosts" => "ghost",
        "bats" => "bat",
        "spiders" => "spider",
        "faces" => "face",
        "columns" => "column",
        other => other,
    }
}

/// Lowercased name with any xLights version prefix removed.
pub fn normalize_name(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    strip_version_prefix(&lower).trim().to_string()
}

/// Strips `NN.NN`, `NN.NN.N` and an optional `grp`/`mod`/`sub` marker from the front.
fn strip_version_prefix(name: &str) -> &str {
    fn digits(s: &str, max: usize) -> Option<usize> {
        let n = s.bytes().take_while(u8::is_ascii_digit).count();
        (n >= 1 && n <= max).then_some(n)
    }

    let Some(major) = digits(name, 3) else {
        return name;
    };
    let Some(rest) = name.get(major..).and_then(|r| r.strip_prefix('.')) else {
        return name;
    };
    let Some(minor) = digits(rest, 3) else {
        return name;
    };
    let mut rest = rest.get(minor..).unwrap_or_default();
    if let Some(patch_rest) = rest.strip_prefix('.') {
        if let Some(patch) = digits(patch_rest, usize::MAX) {
            rest = patch_rest.get(patch..).unwrap_or_default();
        }
    }
    for marker in ["grp", "mod", "sub"] {
        if let Some(stripped) = rest.strip_prefix(marker) {
            rest = stripped;
            break;
        }
    }
    rest
}

/// Canonical tokens: split on non-alphanumeric and letter/digit boundaries,
/// noise words dropped, synonyms folded, compounds merged.
pub fn tokenize(name: &str) -> Vec<String> {
    let normalized = normalize_name(name);
    let mut raw: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_is_digit = false;
    for ch in normalized.chars() {
        if ch.is_alphanumeric() {
            let is_digit = ch.is_ascii_digit();
            if !current.is_empty() && is_digit != current_is_digit {
                raw.push(std::mem::take(&mut current));
            }
            current_is_digit = is_digit;
            current.push(ch);
        } else if !current.is_empty() {
            raw.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        raw.push(current);
    }

    let mut tokens: Vec<String> = Vec::with_capacity(raw.len());
    let mut iter = raw.iter().map(String::as_str).peekable();
    while let Some(token) = iter.next() {
        if NOISE_WORDS.contains(&token) {
            continue;
        }
        if let Some(next) = iter.peek() {
            if let Some((_, _, merged)) = COMPOUNDS.iter().find(|(a, b, _)| *a == token && b == next) {
                tokens.push((*merged).to_string());
                iter.next();
                continue;
            }
        }
        tokens.push(canonical(token).to_string());
    }
    tokens
}

fn is_number(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

/// Tokens with any trailing numeric tokens removed (`arch 12` → `arch`).
pub fn base_tokens(tokens: &[String]) -> &[String] {
    let keep = tokens.len() - tokens.iter().rev().take_while(|t| is_number(t)).count();
    tokens.get(..keep).unwrap_or_default()
}

/// Similarity of two names in [0, 1].
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let ta = tokenize(a);
    let tb = tokenize(b);

    if ta.is_empty() || tb.is_empty() {
        // Names made only of noise words: fall back to literal equality.
        return if normalize_name(a) == normalize_name(b) {
            EXACT_MATCH
        } else {
            0.0
        };
    }
    if ta == tb {
        return EXACT_MATCH;
    }

    let base_a = base_tokens(&ta);
    let base_b = base_tokens(&tb);
    let base_score = if !base_a.is_empty() && base_a == base_b {
        BASE_MATCH
    } else {
        0.0
    };

    let set_a: BTreeSet<&str> = ta.iter().map(String::as_str).collect();
    let set_b: BTreeSet<&str> = tb.iter().map(String::as_str).collect();
    let shared = set_a.intersection(&set_b).count();
    #[allow(clippy::cast_precision_loss)]
    let mut overlap = shared as f64 / set_a.len().max(set_b.len()) as f64;

    let joined_a = ta.join(" ");
    let joined_b = tb.join(" ");
    let (shorter, longer) = if joined_a.len() <= joined_b.len() {
        (&joined_a, &joined_b)
    } else {
        (&joined_b, &joined_a)
    };
    if shorter.len() >= 3 && longer.contains(shorter.as_str()) {
        overlap += SUBSTRING_BONUS;
    }
    if set_a
        .intersection(&set_b)
        .any(|t| PROP_KEYWORDS.contains(t))
    {
        overlap += KEYWORD_BONUS;
    }

    base_score.max(overlap).min(1.0)
}

/// True when either side's aliases name the other side.
pub fn alias_match(a_name: &str, a_aliases: &[String], b_name: &str, b_aliases: &[String]) -> bool {
    let key_a = tokenize(a_name);
    let key_b = tokenize(b_name);
    let hits = |aliases: &[String], key: &[String]| {
        !key.is_empty() && aliases.iter().any(|alias| tokenize(alias) == key)
    };
    hits(a_aliases, &key_b) || hits(b_aliases, &key_a)
}

/// Normalized suffix of a member reference: the part after the last `/`,
/// tokenized. Used to compare group compositions across layouts.
pub fn member_suffix(member: &str) -> String {
    let tail = member.rsplit('/').next().unwrap_or(member);
    tokenize(tail).join(" ")
}

/// Trailing number of a member name, if it has one.
pub fn trailing_index(member: &str) -> Option<u32> {
    let tokens = tokenize(member);
    tokens.last().filter(|t| is_number(t)).and_then(|t| t.parse().ok())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn strips_version_prefix() {
        assert_eq!(normalize_name("01.02grp Arches"), "arches");
        assert_eq!(normalize_name("1.2.3 Mega Tree"), "mega tree");
        assert_eq!(normalize_name("12.5mod Star"), "star");
        assert_eq!(normalize_name("2024 Tree"), "2024 tree");
    }

    #[test]
    fn tokenizes_on_separators_and_digit_boundaries() {
        assert_eq!(tokenize("Arch-1"), vec!["arch", "1"]);
        assert_eq!(tokenize("Arch_1"), vec!["arch", "1"]);
        assert_eq!(tokenize("Arch1"), vec!["arch", "1"]);
        assert_eq!(tokenize("All Arches GRP"), vec!["arch"]);
    }

    #[test]
    fn folds_synonyms_and_compounds() {
        assert_eq!(tokenize("Mega Tree"), tokenize("MT"));
        assert_eq!(tokenize("Mini Pumpkin L"), vec!["small", "pumpkin", "left"]);
        assert_eq!(tokenize("Candy Cane 3"), vec!["candycane", "3"]);
    }

    #[test]
    fn identical_names_score_one() {
        assert!((name_similarity("Arch 1", "arch-1") - 1.0).abs() < 1e-9);
        assert!((name_similarity("Mega Tree", "MT") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn same_base_different_number() {
        let score = name_similarity("Arch 1", "Arch 7");
        assert!((score - BASE_MATCH).abs() < 1e-9, "got {score}");
    }

    #[test]
    fn unrelated_names_score_zero() {
        assert!(name_similarity("Snowman", "Garage Door").abs() < 1e-9);
    }

    #[test]
    fn similarity_is_symmetric() {
        let pairs = [
            ("Left Window", "Window Left Upper"),
            ("Matrix", "P10 Matrix Panel"),
            ("Star Topper", "Tree Star"),
        ];
        for (a, b) in pairs {
            assert!((name_similarity(a, b) - name_similarity(b, a)).abs() < 1e-12);
        }
    }

    #[test]
    fn more_shared_tokens_score_higher() {
        let one = name_similarity("Roof Line Front", "Roof Edge Back");
        let two = name_similarity("Roof Line Front", "Roof Line Back");
        assert!(two > one);
    }

    #[test]
    fn noise_only_names_compare_literally() {
        assert!((name_similarity("All", "all") - 1.0).abs() < 1e-9);
        assert!(name_similarity("All", "Group").abs() < 1e-9);
    }

    #[test]
    fn alias_match_either_direction() {
        let aliases = vec!["Big Tree".to_string()];
        assert!(!alias_match("Mega Tree", &[], "Tree 16", &[]));
        assert!(alias_match("Large Tree", &[], "Mega Tree", &aliases));
        assert!(alias_match("Mega Tree", &aliases, "Large Tree", &[]));
    }

    #[test]
    fn member_suffix_drops_parent() {
        assert_eq!(member_suffix("Spinner A/Spoke 01"), "spoke 01");
        assert_eq!(trailing_index("Spinner A/Spoke 01"), Some(1));
        assert_eq!(trailing_index("Star"), None);
    }
}
