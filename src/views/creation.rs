//! Bookmark creation view: validates a draft and submits it to the store.
//!
//! Validation happens before any store call: blank title/URL or a missing
//! owner never reaches the network. Submissions take `&mut self`, so one form
//! cannot have two submissions in flight.

use tracing::{error, info};
use uuid::Uuid;

use crate::store::{Bookmark, BookmarkStore, NewBookmark, StoreError};
use crate::views::notice::Notice;

const SCHEME_PREFIX: &str = "https://";
const KNOWN_SCHEMES: [&str; 2] = ["http://", "https://"];

pub const MSG_MISSING_FIELDS: &str = "Please enter both title and URL";
pub const MSG_NOT_AUTHENTICATED: &str = "User not authenticated";
pub const MSG_ADDED: &str = "Bookmark added successfully";
pub const MSG_ADD_FAILED: &str = "Failed to add bookmark. Try again.";

#[derive(Debug, thiserror::Error)]
pub enum CreateError {
    #[error("title and url are required")]
    MissingFields,
    #[error("no authenticated owner")]
    NotAuthenticated,
    #[error("store rejected bookmark: {0}")]
    Store(#[from] StoreError),
}

impl CreateError {
    /// Toast shown for this failure.
    #[must_use]
    pub fn notice(&self) -> Notice {
        match self {
            Self::MissingFields => Notice::error(MSG_MISSING_FIELDS),
            Self::NotAuthenticated => Notice::error(MSG_NOT_AUTHENTICATED),
            Self::Store(_) => Notice::error(MSG_ADD_FAILED),
        }
    }
}

impl crate::frame::ErrorCode for CreateError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::MissingFields => "E_MISSING_FIELDS",
            Self::NotAuthenticated => "E_NOT_AUTHENTICATED",
            Self::Store(_) => "E_STORE_REJECTED",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

/// Prefix `https://` unless the URL already carries an http(s) scheme.
/// The scheme check ignores case; hosts like `httpbin.org` still get a prefix.
#[must_use]
pub fn normalize_url(url: &str) -> String {
    let trimmed = url.trim();
    let has_scheme = KNOWN_SCHEMES.iter().any(|scheme| {
        trimmed
            .get(..scheme.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(scheme))
    });
    if has_scheme {
        trimmed.to_owned()
    } else {
        format!("{SCHEME_PREFIX}{trimmed}")
    }
}

/// Turn raw form input into an insertable bookmark.
///
/// # Errors
///
/// Returns [`CreateError::MissingFields`] if either field is blank and
/// [`CreateError::NotAuthenticated`] if there is no owner.
pub fn validate(title: &str, url: &str, owner_id: Option<Uuid>) -> Result<NewBookmark, CreateError> {
    let title = title.trim();
    if title.is_empty() || url.trim().is_empty() {
        return Err(CreateError::MissingFields);
    }
    let Some(owner_id) = owner_id else {
        return Err(CreateError::NotAuthenticated);
    };

    Ok(NewBookmark { owner_id, title: title.to_owned(), url: normalize_url(url) })
}

/// Title/URL input state for one creation form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreationForm {
    pub title: String,
    pub url: String,
}

impl CreationForm {
    #[must_use]
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self { title: title.into(), url: url.into() }
    }

    /// Validate and insert the current input. Clears both fields on success.
    ///
    /// # Errors
    ///
    /// Returns a [`CreateError`]; the fields are kept so the user can retry.
    pub async fn submit(&mut self, store: &dyn BookmarkStore, owner_id: Option<Uuid>) -> Result<Bookmark, CreateError> {
        let draft = validate(&self.title, &self.url, owner_id)?;
        match store.insert(draft).await {
            Ok(bookmark) => {
                info!(owner_id = %bookmark.owner_id, id = %bookmark.id, "bookmark created");
                self.title.clear();
                self.url.clear();
                Ok(bookmark)
            }
            Err(e) => {
                error!(error = %e, "bookmark insert failed");
                Err(CreateError::Store(e))
            }
        }
    }

    /// Submit and translate the outcome into a toast.
    pub async fn submit_with_notice(
        &mut self,
        store: &dyn BookmarkStore,
        owner_id: Option<Uuid>,
    ) -> (Result<Bookmark, CreateError>, Notice) {
        let result = self.submit(store, owner_id).await;
        let notice = match &result {
            Ok(_) => Notice::success(MSG_ADDED),
            Err(e) => e.notice(),
        };
        (result, notice)
    }
}

#[cfg(test)]
#[path = "creation_test.rs"]
mod tests;
