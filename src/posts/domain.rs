// Post rules - pure, no store access
use chrono::{DateTime, Utc};

use crate::error::{EngineError, EngineResult};
use crate::models::{NewSkillPost, PostId, SkillPost};

pub const MAX_SKILL_LEN: usize = 60;
pub const MAX_DESCRIPTION_LEN: usize = 1000;

/// Skills compare case-insensitively, so they are stored trimmed and lowercased.
pub fn normalize_skill(skill: &str) -> String {
    skill.trim().to_lowercase()
}

/// Validate caller input and stamp it into a fresh, active post.
///
/// The returned post carries an empty id; the store assigns the real one.
pub fn prepare_post(input: NewSkillPost, now: DateTime<Utc>) -> EngineResult<SkillPost> {
    if input.user_id.as_str().is_empty() {
        return Err(EngineError::validation("post owner is required"));
    }

    let teach = normalize_skill(&input.teach);
    let learn = normalize_skill(&input.learn);
    let teach_category = input.teach_category.trim().to_string();
    let learn_category = input.learn_category.trim().to_string();

    for (field, value) in [
        ("teach", &teach),
        ("learn", &learn),
        ("teachCategory", &teach_category),
        ("learnCategory", &learn_category),
    ] {
        if value.is_empty() {
            return Err(EngineError::validation(format!("{} cannot be empty", field)));
        }
    }

    if teach.len() > MAX_SKILL_LEN || learn.len() > MAX_SKILL_LEN {
        return Err(EngineError::validation(format!(
            "skills are limited to {} characters",
            MAX_SKILL_LEN
        )));
    }

    if teach == learn {
        return Err(EngineError::validation(
            "the skill to teach and the skill to learn must differ",
        ));
    }

    let description = input.description.trim().to_string();
    if description.len() > MAX_DESCRIPTION_LEN {
        return Err(EngineError::validation(format!(
            "description is limited to {} characters",
            MAX_DESCRIPTION_LEN
        )));
    }

    Ok(SkillPost {
        id: PostId::default(),
        user_id: input.user_id,
        user_name: input.user_name,
        user_image_url: input.user_image_url,
        teach,
        teach_category,
        teach_proficiency: input.teach_proficiency.trim().to_string(),
        learn,
        learn_category,
        description,
        location: input
            .location
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty()),
        created_at: now,
        is_active: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserId;

    fn input() -> NewSkillPost {
        NewSkillPost {
            user_id: UserId::new("alice"),
            user_name: "Alice".to_string(),
            teach: "  Guitar ".to_string(),
            teach_category: "music".to_string(),
            teach_proficiency: "advanced".to_string(),
            learn: "SPANISH".to_string(),
            learn_category: "languages".to_string(),
            description: "Weekends".to_string(),
            location: Some("  ".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn normalizes_skills_and_activates() {
        let post = prepare_post(input(), Utc::now()).unwrap();
        assert_eq!(post.teach, "guitar");
        assert_eq!(post.learn, "spanish");
        assert!(post.is_active);
        assert_eq!(post.location, None);
    }

    #[test]
    fn rejects_empty_fields() {
        let mut bad = input();
        bad.learn_category = " ".to_string();
        assert!(matches!(
            prepare_post(bad, Utc::now()),
            Err(EngineError::Validation(msg)) if msg.contains("learnCategory")
        ));

        let mut bad = input();
        bad.user_id = UserId::default();
        assert!(prepare_post(bad, Utc::now()).is_err());
    }

    #[test]
    fn rejects_same_teach_and_learn() {
        let mut bad = input();
        bad.learn = "guitar".to_string();
        assert!(prepare_post(bad, Utc::now()).is_err());
    }

    #[test]
    fn rejects_oversized_description() {
        let mut bad = input();
        bad.description = "x".repeat(MAX_DESCRIPTION_LEN + 1);
        assert!(prepare_post(bad, Utc::now()).is_err());
    }
}
