use std::collections::HashSet;
use std::sync::Arc;

use super::compat::{select_candidates, CompatibilityMode, SelectionContext};
use super::repository::MatchRepository;
use crate::error::EngineResult;
use crate::integrity::Sweeper;
use crate::models::{PostId, SkillPost, UserId};
use crate::posts::PostRepository;

/// Finds posts that complement the user's own active posts.
#[derive(Clone)]
pub struct CompatibilityMatcher {
    posts: PostRepository,
    matches: MatchRepository,
    sweeper: Arc<Sweeper>,
    default_mode: CompatibilityMode,
}

impl CompatibilityMatcher {
    pub fn new(
        posts: PostRepository,
        matches: MatchRepository,
        sweeper: Arc<Sweeper>,
        default_mode: CompatibilityMode,
    ) -> Self {
        Self {
            posts,
            matches,
            sweeper,
            default_mode,
        }
    }

    pub fn default_mode(&self) -> CompatibilityMode {
        self.default_mode
    }

    pub async fn find_candidates(&self, user_id: &UserId) -> EngineResult<Vec<SkillPost>> {
        self.find_candidates_with(user_id, None, None).await
    }

    /// Candidates under an explicit mode, optionally leading with one post.
    ///
    /// Any failed read fails the whole call; a partial list is never returned.
    pub async fn find_candidates_with(
        &self,
        user_id: &UserId,
        mode: Option<CompatibilityMode>,
        highlight: Option<&PostId>,
    ) -> EngineResult<Vec<SkillPost>> {
        let user_posts = self.posts.list_active_by_owner(user_id).await?;
        if user_posts.is_empty() {
            tracing::debug!("User {} has no active posts; no candidates", user_id);
            return Ok(Vec::new());
        }

        let (universe, valid_users, user_matches) = tokio::try_join!(
            self.posts.list_active(),
            self.sweeper.refresh(),
            self.matches.find_for_user(user_id),
        )?;

        let matched_posts: HashSet<PostId> = user_matches
            .iter()
            .flat_map(|m| [m.user1_post_id.clone(), m.user2_post_id.clone()])
            .flatten()
            .collect();

        let mode = mode.unwrap_or(self.default_mode);
        let candidates = select_candidates(
            &user_posts,
            universe,
            SelectionContext {
                user_id,
                valid_users: &valid_users,
                matched_posts: &matched_posts,
                mode,
                highlight,
            },
        );

        tracing::debug!(
            "Found {} candidate(s) for {} across {} post(s) ({} mode)",
            candidates.len(),
            user_id,
            user_posts.len(),
            mode
        );
        Ok(candidates)
    }
}
