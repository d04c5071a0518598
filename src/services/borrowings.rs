//! Borrowing workflow service

use chrono::{Local, NaiveDate};

use crate::{
    error::{AppError, AppResult},
    models::{
        borrowing::{can_access, BorrowingDetails, BorrowingFilter, BorrowingQuery, CreateBorrowing},
        user::UserClaims,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct BorrowingsService {
    repository: Repository,
}

impl BorrowingsService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Borrowings visible to the caller, narrowed by the requested filters
    pub async fn list_borrowings(
        &self,
        caller: &UserClaims,
        query: &BorrowingQuery,
    ) -> AppResult<Vec<BorrowingDetails>> {
        let filter = BorrowingFilter::resolve(caller, query)?;
        self.repository.borrowings_list(&filter).await
    }

    /// Get one borrowing; others' borrowings look missing to non-staff callers
    pub async fn get_borrowing(&self, caller: &UserClaims, id: i32) -> AppResult<BorrowingDetails> {
        let borrowing = self.repository.borrowings_get_details(id).await?;
        if !can_access(caller, borrowing.user_id) {
            return Err(AppError::NotFound(format!("Borrowing {} not found", id)));
        }
        Ok(borrowing)
    }

    /// Borrow a book on behalf of the caller
    pub async fn create_borrowing(
        &self,
        caller: &UserClaims,
        request: CreateBorrowing,
    ) -> AppResult<BorrowingDetails> {
        let new = request.into_new_borrowing(today())?;
        let id = self.repository.borrowings_create(caller.user_id, &new).await?;

        tracing::info!(
            borrowing_id = id,
            book_id = new.book_id,
            user_id = caller.user_id,
            "Book borrowed"
        );

        self.repository.borrowings_get_details(id).await
    }

    /// Record the return of a borrowed book
    pub async fn return_borrowing(
        &self,
        caller: &UserClaims,
        id: i32,
        actual_return_date: NaiveDate,
    ) -> AppResult<BorrowingDetails> {
        self.repository
            .borrowings_return(caller, id, actual_return_date)
            .await?;

        tracing::info!(
            borrowing_id = id,
            user_id = caller.user_id,
            %actual_return_date,
            "Book returned"
        );

        self.repository.borrowings_get_details(id).await
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}
