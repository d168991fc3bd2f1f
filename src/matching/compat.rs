// Compatibility rules - pure functions over post snapshots
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::models::{PostId, SkillPost, UserId};

/// Which predicate decides that two posts complement each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompatibilityMode {
    /// Teach category of one side equals learn category of the other, both ways.
    #[default]
    Category,
    /// Teach skill of one side equals learn skill of the other, both ways,
    /// ignoring case.
    Exact,
    /// Either of the above.
    ExactOrCategory,
}

impl CompatibilityMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Category => "category",
            Self::Exact => "exact",
            Self::ExactOrCategory => "exact_or_category",
        }
    }
}

impl fmt::Display for CompatibilityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompatibilityMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "category" => Ok(Self::Category),
            "exact" => Ok(Self::Exact),
            "exact_or_category" | "exact-or-category" => Ok(Self::ExactOrCategory),
            other => Err(format!("unknown compatibility mode: {}", other)),
        }
    }
}

fn same_skill(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

pub fn exact_match(p: &SkillPost, q: &SkillPost) -> bool {
    same_skill(&p.teach, &q.learn) && same_skill(&p.learn, &q.teach)
}

pub fn category_match(p: &SkillPost, q: &SkillPost) -> bool {
    p.teach_category == q.learn_category && p.learn_category == q.teach_category
}

/// Symmetric in `p` and `q` for every mode.
pub fn is_compatible(p: &SkillPost, q: &SkillPost, mode: CompatibilityMode) -> bool {
    match mode {
        CompatibilityMode::Category => category_match(p, q),
        CompatibilityMode::Exact => exact_match(p, q),
        CompatibilityMode::ExactOrCategory => exact_match(p, q) || category_match(p, q),
    }
}

/// Everything candidate selection needs besides the posts themselves.
#[derive(Debug, Clone, Copy)]
pub struct SelectionContext<'a> {
    pub user_id: &'a UserId,
    pub valid_users: &'a HashSet<UserId>,
    /// Post ids already linked to one of the user's matches.
    pub matched_posts: &'a HashSet<PostId>,
    pub mode: CompatibilityMode,
    pub highlight: Option<&'a PostId>,
}

/// Cross every user post with every eligible post in `universe` and keep the
/// compatible ones, one entry per post id.
///
/// Order is newest first with the id as tiebreak, so repeated calls over the
/// same data agree. A highlighted post, when present, leads.
pub fn select_candidates(
    user_posts: &[SkillPost],
    universe: Vec<SkillPost>,
    ctx: SelectionContext<'_>,
) -> Vec<SkillPost> {
    if user_posts.is_empty() {
        return Vec::new();
    }

    let mut seen: HashSet<PostId> = HashSet::new();
    let mut candidates: Vec<SkillPost> = universe
        .into_iter()
        .filter(|q| q.is_active)
        .filter(|q| &q.user_id != ctx.user_id)
        .filter(|q| ctx.valid_users.contains(&q.user_id))
        .filter(|q| !ctx.matched_posts.contains(&q.id))
        .filter(|q| user_posts.iter().any(|p| is_compatible(p, q, ctx.mode)))
        .filter(|q| seen.insert(q.id.clone()))
        .collect();

    candidates.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });

    if let Some(highlight) = ctx.highlight {
        if let Some(pos) = candidates.iter().position(|q| &q.id == highlight) {
            let post = candidates.remove(pos);
            candidates.insert(0, post);
        }
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn post(id: &str, owner: &str, teach: (&str, &str), learn: (&str, &str)) -> SkillPost {
        SkillPost {
            id: PostId::new(id),
            user_id: UserId::new(owner),
            user_name: owner.to_string(),
            user_image_url: None,
            teach: teach.0.to_string(),
            teach_category: teach.1.to_string(),
            teach_proficiency: String::new(),
            learn: learn.0.to_string(),
            learn_category: learn.1.to_string(),
            description: String::new(),
            location: None,
            created_at: Utc::now(),
            is_active: true,
        }
    }

    fn users(ids: &[&str]) -> HashSet<UserId> {
        ids.iter().map(|id| UserId::new(*id)).collect()
    }

    #[test]
    fn category_match_is_symmetric() {
        let a = post("p1", "a", ("guitar", "music"), ("spanish", "languages"));
        let b = post("p2", "b", ("french", "languages"), ("piano", "music"));

        assert!(category_match(&a, &b));
        assert!(category_match(&b, &a));
        assert!(!exact_match(&a, &b));
    }

    #[test]
    fn exact_match_ignores_case() {
        let a = post("p1", "a", ("Guitar", "music"), ("spanish", "languages"));
        let b = post("p2", "b", ("SPANISH", "other"), ("guitar", "other"));

        assert!(exact_match(&a, &b));
        assert!(!category_match(&a, &b));
        assert!(is_compatible(&a, &b, CompatibilityMode::ExactOrCategory));
        assert!(!is_compatible(&a, &b, CompatibilityMode::Category));
    }

    #[test]
    fn parses_mode_names() {
        assert_eq!(
            "exact_or_category".parse::<CompatibilityMode>().unwrap(),
            CompatibilityMode::ExactOrCategory
        );
        assert_eq!(
            "Category".parse::<CompatibilityMode>().unwrap(),
            CompatibilityMode::Category
        );
        assert!("fuzzy".parse::<CompatibilityMode>().is_err());
        assert_eq!(CompatibilityMode::default(), CompatibilityMode::Category);
    }

    #[test]
    fn selection_excludes_self_invalid_matched_and_inactive() {
        let me = UserId::new("a");
        let mine = vec![post("p1", "a", ("guitar", "music"), ("spanish", "languages"))];
        let mut inactive = post("q4", "b", ("spanish", "languages"), ("guitar", "music"));
        inactive.is_active = false;
        let universe = vec![
            post("own", "a", ("spanish", "languages"), ("guitar", "music")),
            post("q1", "b", ("spanish", "languages"), ("guitar", "music")),
            post("q2", "ghost", ("spanish", "languages"), ("guitar", "music")),
            post("q3", "c", ("spanish", "languages"), ("guitar", "music")),
            post("q5", "c", ("cooking", "food"), ("guitar", "music")),
            inactive,
        ];
        let valid = users(&["a", "b", "c"]);
        let matched: HashSet<PostId> = [PostId::new("q3")].into_iter().collect();

        let result = select_candidates(
            &mine,
            universe,
            SelectionContext {
                user_id: &me,
                valid_users: &valid,
                matched_posts: &matched,
                mode: CompatibilityMode::Category,
                highlight: None,
            },
        );

        let ids: Vec<&str> = result.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["q1"]);
    }

    #[test]
    fn selection_dedupes_posts_hit_by_several_user_posts() {
        let me = UserId::new("a");
        let mine = vec![
            post("p1", "a", ("guitar", "music"), ("spanish", "languages")),
            post("p2", "a", ("piano", "music"), ("french", "languages")),
        ];
        let universe = vec![
            post("q1", "b", ("spanish", "languages"), ("guitar", "music")),
            post("q2", "b", ("german", "languages"), ("drums", "music")),
        ];
        let valid = users(&["a", "b"]);
        let matched = HashSet::new();

        let result = select_candidates(
            &mine,
            universe,
            SelectionContext {
                user_id: &me,
                valid_users: &valid,
                matched_posts: &matched,
                mode: CompatibilityMode::Category,
                highlight: None,
            },
        );

        // Same owner through two posts is fine; each post appears once
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn selection_orders_newest_first_and_honours_highlight() {
        let me = UserId::new("a");
        let mine = vec![post("p1", "a", ("guitar", "music"), ("spanish", "languages"))];
        let now = Utc::now();
        let mut old = post("old", "b", ("spanish", "languages"), ("guitar", "music"));
        old.created_at = now - Duration::days(2);
        let mut mid = post("mid", "c", ("spanish", "languages"), ("guitar", "music"));
        mid.created_at = now - Duration::days(1);
        let mut new = post("new", "d", ("spanish", "languages"), ("guitar", "music"));
        new.created_at = now;
        let valid = users(&["a", "b", "c", "d"]);
        let matched = HashSet::new();

        let ctx = SelectionContext {
            user_id: &me,
            valid_users: &valid,
            matched_posts: &matched,
            mode: CompatibilityMode::Category,
            highlight: None,
        };
        let plain = select_candidates(&mine, vec![old.clone(), new.clone(), mid.clone()], ctx);
        let ids: Vec<&str> = plain.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);

        let highlight = PostId::new("old");
        let ctx = SelectionContext {
            highlight: Some(&highlight),
            ..ctx
        };
        let highlighted = select_candidates(&mine, vec![mid, old, new], ctx);
        let ids: Vec<&str> = highlighted.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["old", "new", "mid"]);
    }

    #[test]
    fn no_user_posts_means_no_candidates() {
        let me = UserId::new("a");
        let valid = users(&["a", "b"]);
        let matched = HashSet::new();
        let universe = vec![post("q1", "b", ("spanish", "languages"), ("guitar", "music"))];

        let result = select_candidates(
            &[],
            universe,
            SelectionContext {
                user_id: &me,
                valid_users: &valid,
                matched_posts: &matched,
                mode: CompatibilityMode::Category,
                highlight: None,
            },
        );
        assert!(result.is_empty());
    }
}
