//! Borrowing lifecycle methods on Repository
//!
//! Borrow and return each run in a single transaction. Dropping the
//! transaction on an early `?` rolls back whatever was written so far.

use chrono::NaiveDate;
use sqlx::{Postgres, QueryBuilder};

use super::Repository;
use crate::{
    error::{AppError, AppResult},
    models::{
        borrowing::{
            can_access, Borrowing, BorrowingDetails, BorrowingFilter, BorrowingRow, BorrowingStatus,
            NewBorrowing,
        },
        user::UserClaims,
    },
};

const DETAILS_SELECT: &str = r#"
    SELECT br.id, br.borrow_date, br.expected_return_date, br.actual_return_date,
           br.user_id, u.email AS user_email,
           b.id AS book_id, b.title AS book_title, b.author AS book_author,
           b.cover AS book_cover, b.inventory AS book_inventory,
           b.daily_fee AS book_daily_fee
    FROM borrowings br
    JOIN books b ON b.id = br.book_id
    JOIN users u ON u.id = br.user_id
"#;

impl Repository {
    /// List borrowings matching an already-scoped filter
    pub async fn borrowings_list(&self, filter: &BorrowingFilter) -> AppResult<Vec<BorrowingDetails>> {
        let mut builder = QueryBuilder::<Postgres>::new(DETAILS_SELECT);
        builder.push(" WHERE TRUE");

        if let Some(user_id) = filter.user_id {
            builder.push(" AND br.user_id = ").push_bind(user_id);
        }

        match filter.status {
            Some(BorrowingStatus::Open) => {
                builder.push(" AND br.actual_return_date IS NULL");
            }
            Some(BorrowingStatus::Closed) => {
                builder.push(" AND br.actual_return_date IS NOT NULL");
            }
            None => {}
        }

        builder.push(" ORDER BY br.id");

        let rows = builder
            .build_query_as::<BorrowingRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(BorrowingDetails::from).collect())
    }

    /// Get borrowing details by ID
    pub async fn borrowings_get_details(&self, id: i32) -> AppResult<BorrowingDetails> {
        let query = format!("{} WHERE br.id = $1", DETAILS_SELECT);
        sqlx::query_as::<_, BorrowingRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(BorrowingDetails::from)
            .ok_or_else(|| borrowing_not_found(id))
    }

    /// Borrow a book: insert the open borrowing and take one copy out of the
    /// inventory, or do neither.
    pub async fn borrowings_create(&self, user_id: i32, new: &NewBorrowing) -> AppResult<i32> {
        let mut tx = self.pool.begin().await?;

        // Serializes concurrent borrows of the same book
        let book = self
            .books_lock(&mut *tx, new.book_id)
            .await?
            .ok_or_else(|| {
                AppError::field(
                    "book",
                    format!("Invalid pk \"{}\" - object does not exist.", new.book_id),
                )
            })?;

        new.check_against(&book)?;

        let borrowing_id = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO borrowings (borrow_date, expected_return_date, actual_return_date, book_id, user_id)
            VALUES ($1, $2, NULL, $3, $4)
            RETURNING id
            "#,
        )
        .bind(new.borrow_date)
        .bind(new.expected_return_date)
        .bind(new.book_id)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            // The book row is locked, so only a token for a deleted user gets here
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                AppError::Authentication("User no longer exists".to_string())
            }
            other => AppError::Database(other),
        })?;

        self.books_decrement_inventory(&mut *tx, new.book_id).await?;

        tx.commit().await?;
        Ok(borrowing_id)
    }

    /// Return a book: close the borrowing and put one copy back, or do neither.
    pub async fn borrowings_return(
        &self,
        caller: &UserClaims,
        id: i32,
        actual_return_date: NaiveDate,
    ) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let borrowing = sqlx::query_as::<_, Borrowing>(
            "SELECT * FROM borrowings WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .filter(|b| can_access(caller, b.user_id))
        .ok_or_else(|| borrowing_not_found(id))?;

        borrowing.check_return(actual_return_date)?;

        let result = sqlx::query(
            "UPDATE borrowings SET actual_return_date = $2 WHERE id = $1 AND actual_return_date IS NULL",
        )
        .bind(id)
        .bind(actual_return_date)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::AlreadyReturned(
                "Book has already been returned".to_string(),
            ));
        }

        self.books_increment_inventory(&mut *tx, borrowing.book_id).await?;

        tx.commit().await?;
        Ok(())
    }
}

fn borrowing_not_found(id: i32) -> AppError {
    AppError::NotFound(format!("Borrowing {} not found", id))
}
