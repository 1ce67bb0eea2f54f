//! Post record construction
//!
//! Turns the raw text of one post into a `PostRecord`, deciding per field
//! whether bad data skips the post, fails it, or is just left unset.

use crate::crawler::parser::RawPost;
use crate::model::{parse_post_date, FieldValue, PostRecord, ScanMode};
use thiserror::Error;
use url::Url;

/// Per-post extraction failures
///
/// These are counted and logged; they never stop the traversal.
#[derive(Debug, Error, PartialEq)]
pub enum ExtractError {
    #[error("post has no review text")]
    MissingReview,
}

/// What to do with one post
#[derive(Debug, Clone, PartialEq)]
pub enum PostOutcome {
    /// Hand the record to the pipeline
    Dispatch(PostRecord),
    /// No parseable date; dropped without counting as an error
    SkippedUndated,
    /// Not newer than the checkpoint of an incremental scan
    SkippedBeforeCheckpoint,
}

/// Builds the record for one post
///
/// Steps, in order: parse the date (skip if missing), apply the incremental
/// checkpoint, then read the remaining fields. Malformed optional numbers
/// are logged and left unset.
pub fn extract_post(
    raw: RawPost,
    post_url: &Url,
    mode: &ScanMode,
) -> Result<PostOutcome, ExtractError> {
    let date = match FieldValue::parse_with(raw.date.as_deref(), parse_post_date) {
        FieldValue::Present(date) => date,
        FieldValue::Absent => return Ok(PostOutcome::SkippedUndated),
        FieldValue::Malformed(text) => {
            tracing::debug!("Unparseable post date '{}' on {}", text, post_url);
            return Ok(PostOutcome::SkippedUndated);
        }
    };

    if mode.skips(&date) {
        return Ok(PostOutcome::SkippedBeforeCheckpoint);
    }

    let review = FieldValue::text(raw.review.as_deref())
        .ok()
        .ok_or(ExtractError::MissingReview)?;

    let opinion_weight = lenient::<f64>("opinion weight", raw.opinion_weight.as_deref(), post_url);
    let vote_rate = lenient::<f64>("vote rate", raw.vote_rate.as_deref(), post_url);
    let year = lenient::<u32>("year", raw.year.as_deref(), post_url);

    Ok(PostOutcome::Dispatch(PostRecord {
        id: None,
        username: raw.username,
        faculty: FieldValue::text(raw.faculty.as_deref()).ok(),
        year,
        opinion_weight,
        date,
        professor: raw.professor,
        rating: raw.rating.unwrap_or_default(),
        vote_rate,
        course: FieldValue::text(raw.course.as_deref()).ok(),
        review,
        post_url: post_url.to_string(),
        language: None,
        vectors: None,
    }))
}

fn lenient<T: std::str::FromStr>(field: &str, raw: Option<&str>, post_url: &Url) -> Option<T> {
    let value = FieldValue::<T>::parse(raw);
    if let Some(text) = value.malformed() {
        tracing::warn!("Invalid {} value '{}' on {}", field, text, post_url);
    }
    value.ok()
}
