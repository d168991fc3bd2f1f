// Match lifecycle - creation with duplicate guard, unmatch and post cascades
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::compat::{is_compatible, CompatibilityMode};
use super::repository::MatchRepository;
use super::state::MatchState;
use crate::cascade::Cascade;
use crate::chat::ChatRepository;
use crate::error::{EngineError, EngineResult};
use crate::identity::{require_user, DynIdentityProvider};
use crate::integrity::Sweeper;
use crate::models::{Match, MatchId, NotificationKind, PostId, Side, SkillPost, UserId};
use crate::notify::{DynNotificationSink, NotificationRequest};
use crate::posts::PostRepository;
use crate::users::UserRepository;

/// Teach/learn of one side, from the live post when it still exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SideSkills {
    pub teach: String,
    pub learn: String,
    pub live: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiveSkills {
    pub user1: SideSkills,
    pub user2: SideSkills,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostCascadeReport {
    pub post_id: PostId,
    pub matches_deleted: usize,
    pub post_deleted: bool,
}

#[derive(Clone)]
pub struct MatchLifecycle {
    identity: DynIdentityProvider,
    users: UserRepository,
    posts: PostRepository,
    matches: MatchRepository,
    chat: ChatRepository,
    sweeper: Arc<Sweeper>,
    notifier: DynNotificationSink,
}

impl MatchLifecycle {
    pub fn new(
        identity: DynIdentityProvider,
        users: UserRepository,
        posts: PostRepository,
        matches: MatchRepository,
        chat: ChatRepository,
        sweeper: Arc<Sweeper>,
        notifier: DynNotificationSink,
    ) -> Self {
        Self {
            identity,
            users,
            posts,
            matches,
            chat,
            sweeper,
            notifier,
        }
    }

    /// Pair the signed-in user's post with a candidate post.
    ///
    /// Both posts are re-read first: each must still exist, be active,
    /// belong to an existing user and be compatible with the other. The
    /// match snapshots names, images and skills from the stored posts, and
    /// at most one match is ever written per post pair. If the read-back
    /// after the insert fails the record stays in the store.
    pub async fn create_match(
        &self,
        user_post: &SkillPost,
        candidate_post: &SkillPost,
    ) -> EngineResult<Match> {
        let current = require_user(self.identity.as_ref())?;
        if user_post.user_id != current {
            return Err(EngineError::validation(
                "the first post must belong to the signed-in user",
            ));
        }
        if user_post.user_id == candidate_post.user_id {
            return Err(EngineError::validation("cannot match with your own post"));
        }

        let (mine, theirs) = tokio::try_join!(
            self.matchable_post(&user_post.id),
            self.matchable_post(&candidate_post.id),
        )?;
        if mine.user_id != current || mine.user_id == theirs.user_id {
            return Err(EngineError::validation("post owners changed"));
        }
        if !is_compatible(&mine, &theirs, CompatibilityMode::ExactOrCategory) {
            return Err(EngineError::validation(format!(
                "posts {} and {} are not compatible",
                mine.id, theirs.id
            )));
        }

        let existing = self.matches.find_by_post_pair(&mine.id, &theirs.id).await?;
        let state = MatchState::observe(existing.as_ref());
        if state.is_active() {
            return Err(self.duplicate(&mine.id, &theirs.id));
        }

        let now = Utc::now();
        let state = state
            .begin_create(mine.id.clone(), theirs.id.clone(), now)
            .map_err(|e| EngineError::validation(e.to_string()))?;

        let draft = snapshot(&mine, &theirs, now);
        let Some(id) = self
            .matches
            .insert_for_pair(&draft, &mine.id, &theirs.id)
            .await?
        else {
            // Another create for the same pair won the race
            return Err(self.duplicate(&mine.id, &theirs.id));
        };

        let stored = self
            .matches
            .get(&id)
            .await?
            .ok_or_else(|| EngineError::not_found("match", id.as_str()))?;
        let state = state
            .confirm(&stored)
            .map_err(|e| EngineError::validation(e.to_string()))?;

        tracing::info!(
            "Match {} {}: {} ({}) <-> {} ({})",
            stored.id,
            state.state_name(),
            stored.user1_id,
            stored.user1_teach,
            stored.user2_id,
            stored.user2_teach
        );

        self.notify_match(&stored);
        Ok(stored)
    }

    /// Delete a match and its conversation. Messages go first; if that step
    /// fails the match is left in place. Unmatching an absent match succeeds.
    pub async fn unmatch(&self, match_id: &MatchId) -> EngineResult<()> {
        let current = require_user(self.identity.as_ref())?;

        let found = self.matches.get(match_id).await?;
        if let Some(m) = &found {
            if !m.involves(&current) {
                return Err(EngineError::validation("not a participant of this match"));
            }
        }

        let state = MatchState::observe(found.as_ref());
        let was = state.state_name();
        let state = state
            .delete(Utc::now())
            .map_err(|e| EngineError::validation(e.to_string()))?;

        match_removal(
            &self.chat,
            &self.matches,
            vec![match_id.clone()],
            format!("unmatch {}", match_id),
        )
        .run_to_completion()
        .await?;
        tracing::info!("Unmatched {} ({} -> {})", match_id, was, state.state_name());
        Ok(())
    }

    /// Matches in which the user holds either slot, with matches that point
    /// at a deleted user removed on the way out.
    pub async fn matches_for_user(&self, user_id: &UserId) -> EngineResult<Vec<Match>> {
        let fetched = self.matches.find_for_user(user_id).await?;
        self.sweeper.sweep_orphan_matches(fetched).await
    }

    /// Direct lookup; absence is an error here.
    pub async fn get_match(&self, match_id: &MatchId) -> EngineResult<Match> {
        self.matches
            .get(match_id)
            .await?
            .ok_or_else(|| EngineError::not_found("match", match_id.as_str()))
    }

    /// Delete a post with every match linked to it and their messages.
    ///
    /// Safe to re-run after a failure at any step. When the post is already
    /// gone only the matches still linked by id are cleaned up.
    pub async fn delete_post_cascade(&self, post_id: &PostId) -> EngineResult<PostCascadeReport> {
        let current = require_user(self.identity.as_ref())?;

        let post = self.posts.get(post_id).await?;
        let targets = match &post {
            Some(post) => {
                if post.user_id != current {
                    return Err(EngineError::validation("cannot delete another user's post"));
                }
                let (precise, coarse) = tokio::try_join!(
                    self.matches.find_by_post(post_id),
                    self.matches.find_for_user(&post.user_id),
                )?;
                linked_matches(post, precise, coarse)
            }
            None => self.matches.find_by_post(post_id).await?,
        };

        let match_ids: Vec<MatchId> = targets.into_iter().map(|m| m.id).collect();
        let posts = self.posts.clone();
        let target_post = post_id.clone();
        let post_deleted = Arc::new(AtomicBool::new(false));
        let post_flag = post_deleted.clone();

        match_removal(
            &self.chat,
            &self.matches,
            match_ids.clone(),
            format!("delete post {}", post_id),
        )
        .step("delete_post", move || async move {
            let removed = posts.delete(&target_post).await?;
            post_flag.store(removed, Ordering::SeqCst);
            Ok(())
        })
        .run_to_completion()
        .await?;

        let report = PostCascadeReport {
            post_id: post_id.clone(),
            matches_deleted: match_ids.len(),
            post_deleted: post_deleted.load(Ordering::SeqCst),
        };
        tracing::info!(
            "Post {} cascade done: {} match(es) removed, post removed: {}",
            post_id,
            report.matches_deleted,
            report.post_deleted
        );
        Ok(report)
    }

    /// Current teach/learn for both sides. A side whose post is gone keeps
    /// the snapshot taken when the match was created.
    pub async fn resolve_live_skills(&self, m: &Match) -> EngineResult<LiveSkills> {
        let (post1, post2) = tokio::try_join!(
            self.optional_post(m.post_id(Side::User1)),
            self.optional_post(m.post_id(Side::User2)),
        )?;

        Ok(LiveSkills {
            user1: side_skills(m, Side::User1, post1.as_ref()),
            user2: side_skills(m, Side::User2, post2.as_ref()),
        })
    }

    /// The stored post, provided it is active and its owner still exists.
    async fn matchable_post(&self, id: &PostId) -> EngineResult<SkillPost> {
        let post = self
            .posts
            .get(id)
            .await?
            .ok_or_else(|| EngineError::not_found("post", id.as_str()))?;
        if !post.is_active {
            return Err(EngineError::validation(format!("post {} is not active", id)));
        }
        if !self.users.exists(&post.user_id).await? {
            return Err(EngineError::not_found("user", post.user_id.as_str()));
        }
        Ok(post)
    }

    fn duplicate(&self, a: &PostId, b: &PostId) -> EngineError {
        tracing::info!("Rejected duplicate match for posts {} and {}", a, b);
        EngineError::DuplicateMatch(a.clone(), b.clone())
    }

    async fn optional_post(&self, id: Option<&PostId>) -> EngineResult<Option<SkillPost>> {
        match id {
            Some(id) => Ok(self.posts.get(id).await?),
            None => Ok(None),
        }
    }

    fn notify_match(&self, m: &Match) {
        for (target, other, teach, learn) in [
            (&m.user1_id, &m.user2_name, &m.user2_teach, &m.user2_learn),
            (&m.user2_id, &m.user1_name, &m.user1_teach, &m.user1_learn),
        ] {
            self.notifier.emit(NotificationRequest {
                target: target.clone(),
                kind: NotificationKind::NewMatch,
                title: "New match".to_string(),
                message: format!(
                    "You matched with {}: they teach {} and want to learn {}",
                    other, teach, learn
                ),
                related_id: Some(m.id.to_string()),
            });
        }
    }
}

/// Children-first removal of whole matches: every message of the matches,
/// then the match documents. Callers may append further steps.
pub(crate) fn match_removal(
    chat: &ChatRepository,
    matches: &MatchRepository,
    ids: Vec<MatchId>,
    name: String,
) -> Cascade {
    let chat = chat.clone();
    let matches = matches.clone();
    let message_ids = ids.clone();

    Cascade::new(name)
        .step("delete_messages", move || async move {
            chat.delete_for_matches(&message_ids).await?;
            Ok(())
        })
        .step("delete_matches", move || async move {
            matches.delete_many(&ids).await?;
            Ok(())
        })
}

fn snapshot(user_post: &SkillPost, candidate: &SkillPost, now: chrono::DateTime<Utc>) -> Match {
    Match {
        id: MatchId::default(),
        user1_id: user_post.user_id.clone(),
        user1_name: user_post.user_name.clone(),
        user1_image_url: user_post.user_image_url.clone(),
        user1_teach: user_post.teach.clone(),
        user1_learn: user_post.learn.clone(),
        user2_id: candidate.user_id.clone(),
        user2_name: candidate.user_name.clone(),
        user2_image_url: candidate.user_image_url.clone(),
        user2_teach: candidate.teach.clone(),
        user2_learn: candidate.learn.clone(),
        user1_post_id: Some(user_post.id.clone()),
        user2_post_id: Some(candidate.id.clone()),
        created_at: now,
        last_message: None,
        last_message_at: None,
        unread_count: 0,
    }
}

/// Matches to remove with `post`: everything linked to it by id, plus the
/// owner's unlinked legacy matches whose owner-side skills equal the post's.
fn linked_matches(post: &SkillPost, precise: Vec<Match>, coarse: Vec<Match>) -> Vec<Match> {
    let mut targets: HashMap<MatchId, Match> =
        precise.into_iter().map(|m| (m.id.clone(), m)).collect();

    for m in coarse.into_iter().filter(|m| m.is_legacy()) {
        let Some(side) = m.side_of(&post.user_id) else {
            continue;
        };
        let (teach, learn) = m.skills(side);
        if teach.eq_ignore_ascii_case(&post.teach) && learn.eq_ignore_ascii_case(&post.learn) {
            targets.entry(m.id.clone()).or_insert(m);
        }
    }

    let mut targets: Vec<Match> = targets.into_values().collect();
    targets.sort_by(|a, b| a.id.cmp(&b.id));
    targets
}

fn side_skills(m: &Match, side: Side, post: Option<&SkillPost>) -> SideSkills {
    match post {
        Some(p) => SideSkills {
            teach: p.teach.clone(),
            learn: p.learn.clone(),
            live: true,
        },
        None => {
            let (teach, learn) = m.skills(side);
            SideSkills {
                teach: teach.to_string(),
                learn: learn.to_string(),
                live: false,
            }
        }
    }
}
