// Reviews - submission, rating aggregates, author anonymisation
use chrono::Utc;
use serde_json::json;

use crate::error::{EngineError, EngineResult};
use crate::identity::{require_user, DynIdentityProvider};
use crate::matching::MatchRepository;
use crate::models::{MatchId, NotificationKind, Review, UserId, DELETED_USER_ID, DELETED_USER_NAME};
use crate::notify::{DynNotificationSink, NotificationRequest};
use crate::store::{decode, encode, Direction, Document, DynDocumentStore, Query, StoreResult};
use crate::users::UserRepository;

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;
pub const MAX_COMMENT_LEN: usize = 2000;

#[derive(Clone)]
pub struct ReviewRepository {
    store: DynDocumentStore,
}

impl ReviewRepository {
    pub fn new(store: DynDocumentStore) -> Self {
        Self { store }
    }

    pub async fn insert(&self, review: &Review) -> StoreResult<String> {
        self.store.insert(Review::COLLECTION, encode(review)?).await
    }

    /// Reviews received by a user, newest first.
    pub async fn list_for_user(&self, user_id: &UserId) -> StoreResult<Vec<Review>> {
        self.fetch(
            Query::new()
                .where_eq("reviewedUserId", user_id.as_str())
                .order_by("createdAt", Direction::Desc),
        )
        .await
    }

    pub async fn list_by_author(&self, reviewer_id: &UserId) -> StoreResult<Vec<Review>> {
        self.fetch(Query::new().where_eq("reviewerId", reviewer_id.as_str()))
            .await
    }

    /// Re-attribute every review written by `reviewer_id` to the deleted-user
    /// sentinel. Ratings and comments are kept, so aggregates do not move.
    pub async fn anonymize_author(&self, reviewer_id: &UserId) -> StoreResult<u64> {
        let ids: Vec<String> = self
            .list_by_author(reviewer_id)
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();

        let updated = self
            .store
            .batch_update(
                Review::COLLECTION,
                &ids,
                json!({
                    "reviewerId": DELETED_USER_ID,
                    "reviewerName": DELETED_USER_NAME,
                }),
            )
            .await?;
        tracing::debug!("Anonymized {} review(s) by {}", updated, reviewer_id);
        Ok(updated)
    }

    async fn fetch(&self, query: Query) -> StoreResult<Vec<Review>> {
        self.store
            .query(Review::COLLECTION, &query)
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewReview {
    pub reviewed_user_id: UserId,
    pub match_id: Option<MatchId>,
    pub rating: u8,
    pub comment: String,
}

#[derive(Clone)]
pub struct ReviewService {
    identity: DynIdentityProvider,
    users: UserRepository,
    matches: MatchRepository,
    reviews: ReviewRepository,
    notifier: DynNotificationSink,
}

impl ReviewService {
    pub fn new(
        identity: DynIdentityProvider,
        users: UserRepository,
        matches: MatchRepository,
        reviews: ReviewRepository,
        notifier: DynNotificationSink,
    ) -> Self {
        Self {
            identity,
            users,
            matches,
            reviews,
            notifier,
        }
    }

    /// Review another user as the signed-in user, then refresh the
    /// reviewed user's rating aggregate.
    pub async fn submit(&self, input: NewReview) -> EngineResult<Review> {
        let reviewer_id = require_user(self.identity.as_ref())?;

        if !(MIN_RATING..=MAX_RATING).contains(&input.rating) {
            return Err(EngineError::validation(format!(
                "rating must be between {} and {}",
                MIN_RATING, MAX_RATING
            )));
        }
        if input.reviewed_user_id == reviewer_id {
            return Err(EngineError::validation("cannot review yourself"));
        }
        let comment = input.comment.trim();
        if comment.chars().count() > MAX_COMMENT_LEN {
            return Err(EngineError::validation(format!(
                "comment is limited to {} characters",
                MAX_COMMENT_LEN
            )));
        }

        let (reviewer, reviewed) = tokio::try_join!(
            self.users.get(&reviewer_id),
            self.users.get(&input.reviewed_user_id),
        )?;
        let reviewer = reviewer.ok_or_else(|| EngineError::not_found("user", reviewer_id.as_str()))?;
        if reviewed.is_none() {
            return Err(EngineError::not_found(
                "user",
                input.reviewed_user_id.as_str(),
            ));
        }

        if let Some(match_id) = &input.match_id {
            let m = self
                .matches
                .get(match_id)
                .await?
                .ok_or_else(|| EngineError::not_found("match", match_id.as_str()))?;
            if !m.involves(&reviewer_id) || !m.involves(&input.reviewed_user_id) {
                return Err(EngineError::validation(
                    "review must be for a match between both users",
                ));
            }
        }

        let mut review = Review {
            id: String::new(),
            reviewer_id,
            reviewer_name: reviewer.name,
            reviewed_user_id: input.reviewed_user_id,
            match_id: input.match_id,
            rating: input.rating,
            comment: comment.to_string(),
            created_at: Utc::now(),
        };
        review.id = self.reviews.insert(&review).await?;

        self.recompute_rating(&review.reviewed_user_id).await?;

        self.notifier.emit(NotificationRequest {
            target: review.reviewed_user_id.clone(),
            kind: NotificationKind::NewReview,
            title: "New review".to_string(),
            message: format!("{} rated you {}/{}", review.reviewer_name, review.rating, MAX_RATING),
            related_id: Some(review.id.clone()),
        });

        tracing::info!(
            "Review {} by {} for {} ({} star(s))",
            review.id,
            review.reviewer_id,
            review.reviewed_user_id,
            review.rating
        );
        Ok(review)
    }

    pub async fn list_for_user(&self, user_id: &UserId) -> EngineResult<Vec<Review>> {
        Ok(self.reviews.list_for_user(user_id).await?)
    }

    /// Recompute rating and count from every stored review. Running it twice
    /// gives the same result.
    pub async fn recompute_rating(&self, user_id: &UserId) -> EngineResult<(f64, u32)> {
        let reviews = self.reviews.list_for_user(user_id).await?;
        let (rating, count) = average_rating(&reviews);
        self.users.set_rating(user_id, rating, count).await?;
        Ok((rating, count))
    }
}

fn average_rating(reviews: &[Review]) -> (f64, u32) {
    if reviews.is_empty() {
        return (0.0, 0);
    }
    let total: u32 = reviews.iter().map(|r| u32::from(r.rating)).sum();
    let count = reviews.len() as u32;
    (f64::from(total) / f64::from(count), count)
}
