//! Per-post anonymous numbering for comment authors.

use crate::models::{Comment, Id};

/// Stable `1..=1000` number for `user_id` on `post_id`.
///
/// Hashes the UTF-16 units of `user_id ++ post_id` with the wrapping
/// `h * 31 + c` string hash so numbers agree with ones minted by web clients.
pub fn anonymous_number(user_id: &str, post_id: Id) -> u32 {
    let key = format!("{user_id}{post_id}");
    let mut hash: i32 = 0;
    for unit in key.encode_utf16() {
        hash = hash.wrapping_shl(5).wrapping_sub(hash).wrapping_add(unit as i32);
    }
    ((hash as i64).abs() % 1000 + 1) as u32
}

pub fn anonymous_label(number: u32) -> String {
    format!("익명{number}")
}

/// Name shown next to a comment.
pub fn display_name(comment: &Comment, nickname: Option<&str>) -> String {
    match nickname.map(str::trim).filter(|n| !n.is_empty()) {
        Some(n) if !comment.is_anonymous => n.to_string(),
        _ => anonymous_label(comment.anonymous_number),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn number_is_stable_and_in_range() {
        let a = anonymous_number("user-1", 42);
        assert_eq!(a, anonymous_number("user-1", 42));
        for post in 0..200 {
            let n = anonymous_number("9f1c2b7e-4d3a-4c55-8e0f-0a1b2c3d4e5f", post);
            assert!((1..=1000).contains(&n));
        }
    }

    #[test]
    fn matches_reference_hash() {
        // "a1": ((97 * 31) + 49) = 3056 -> 3056 % 1000 + 1
        assert_eq!(anonymous_number("a", 1), 57);
    }

    #[test]
    fn display_name_respects_anonymity() {
        let now = Utc::now();
        let mut c = Comment {
            id: 1, post_id: 1, parent_id: None, content: "x".into(), is_anonymous: true,
            anonymous_number: 17, likes_count: 0, dislikes_count: 0,
            created_at: now, updated_at: now, author_id: "u".into(),
        };
        assert_eq!(display_name(&c, Some("철수")), "익명17");
        c.is_anonymous = false;
        assert_eq!(display_name(&c, Some("철수")), "철수");
        assert_eq!(display_name(&c, None), "익명17");
    }
}
