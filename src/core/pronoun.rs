//! Vietnamese address-term conventions
//!
//! Vietnamese has no neutral "I"/"you"; the pair of terms both speakers use
//! encodes their relationship. A [`PronounPair`] captures one such
//! convention for a conversation, and the built-in catalog covers the common
//! registers from neutral smalltalk to historical-drama royalty.

use serde::{Deserialize, Serialize};

/// One named xưng hô convention: the four address terms plus a short note on
/// when it applies. Immutable value type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PronounPair {
    pub id: String,
    pub name: String,
    /// How the user refers to themselves.
    pub user_pronoun: String,
    /// How the character addresses the user.
    pub user_by_char: String,
    /// How the character refers to themselves.
    pub char_pronoun: String,
    /// How the user addresses the character.
    pub char_by_user: String,
    pub context: String,
}

fn pair(
    id: &str,
    name: &str,
    user_pronoun: &str,
    user_by_char: &str,
    char_pronoun: &str,
    char_by_user: &str,
    context: &str,
) -> PronounPair {
    PronounPair {
        id: id.to_string(),
        name: name.to_string(),
        user_pronoun: user_pronoun.to_string(),
        user_by_char: user_by_char.to_string(),
        char_pronoun: char_pronoun.to_string(),
        char_by_user: char_by_user.to_string(),
        context: context.to_string(),
    }
}

/// The built-in catalog. The first entry is the fallback when a settings
/// record names a pair that no longer exists.
pub fn builtin_pronoun_pairs() -> Vec<PronounPair> {
    vec![
        pair(
            "neutral",
            "Trung tính",
            "tôi",
            "bạn",
            "tôi",
            "bạn",
            "Giao tiếp thông thường, trung tính",
        ),
        pair(
            "romantic-fm",
            "Em - Anh (Nữ → Nam)",
            "em",
            "em",
            "anh",
            "anh",
            "Quan hệ tình cảm, nữ gọi nam",
        ),
        pair(
            "romantic-mf",
            "Anh - Em (Nam → Nữ)",
            "anh",
            "anh",
            "em",
            "em",
            "Quan hệ tình cảm, nam gọi nữ",
        ),
        pair(
            "friends",
            "Mình - Cậu (Bạn bè)",
            "mình",
            "cậu",
            "mình",
            "cậu",
            "Bạn bè thân thiết",
        ),
        pair(
            "student",
            "Tớ - Cậu (Học sinh)",
            "tớ",
            "cậu",
            "tớ",
            "cậu",
            "Bạn học, học sinh",
        ),
        pair(
            "fantasy",
            "Ta - Ngươi (Fantasy)",
            "ta",
            "ngươi",
            "ta",
            "ngươi",
            "Fantasy, cổ trang, quyền lực",
        ),
        pair(
            "royal",
            "Trẫm - Khanh (Hoàng gia)",
            "trẫm",
            "bệ hạ",
            "thần",
            "khanh",
            "Vua - Thần tử",
        ),
        pair(
            "family-child",
            "Con - Mẹ/Bố (Gia đình)",
            "con",
            "con",
            "mẹ",
            "mẹ",
            "Quan hệ gia đình",
        ),
    ]
}

/// Find a built-in pair by id.
pub fn find_builtin_pair(id: &str) -> Option<PronounPair> {
    builtin_pronoun_pairs().into_iter().find(|p| p.id == id)
}

/// The catalog's first entry, used when nothing else resolves.
pub fn default_pronoun_pair() -> PronounPair {
    builtin_pronoun_pairs()
        .into_iter()
        .next()
        .expect("built-in pronoun catalog is never empty")
}
