//! Borrowing model, lifecycle rules and visibility policy

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use super::book::{Book, Cover};
use super::user::UserClaims;
use crate::error::{AppError, AppResult, FieldErrors};

const REQUIRED: &str = "This field is required.";

/// Borrowing row as stored
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Borrowing {
    pub id: i32,
    pub borrow_date: NaiveDate,
    pub expected_return_date: NaiveDate,
    /// `None` while the book is still out
    pub actual_return_date: Option<NaiveDate>,
    pub book_id: i32,
    pub user_id: i32,
}

/// Open until an actual return date is recorded, then closed for good
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorrowingStatus {
    Open,
    Closed,
}

impl BorrowingStatus {
    pub fn of(actual_return_date: Option<NaiveDate>) -> Self {
        match actual_return_date {
            Some(_) => BorrowingStatus::Closed,
            None => BorrowingStatus::Open,
        }
    }
}

/// Enforces `borrow_date <= expected_return_date` and, when present,
/// `borrow_date <= actual_return_date`.
pub fn validate_dates(
    borrow_date: NaiveDate,
    expected_return_date: NaiveDate,
    actual_return_date: Option<NaiveDate>,
) -> AppResult<()> {
    if borrow_date > expected_return_date {
        return Err(AppError::InvalidDateRange {
            field: "expected_return_date",
            message: "Borrow date should not be later than expected return date".to_string(),
        });
    }

    if let Some(actual) = actual_return_date {
        if borrow_date > actual {
            return Err(AppError::InvalidDateRange {
                field: "actual_return_date",
                message: "Borrow date should not be later than actual return date".to_string(),
            });
        }
    }

    Ok(())
}

impl Borrowing {
    pub fn status(&self) -> BorrowingStatus {
        BorrowingStatus::of(self.actual_return_date)
    }

    /// Checks run against the locked row before recording a return
    pub fn check_return(&self, actual_return_date: NaiveDate) -> AppResult<()> {
        if self.status() == BorrowingStatus::Closed {
            return Err(AppError::AlreadyReturned(
                "Book has already been returned".to_string(),
            ));
        }
        validate_dates(
            self.borrow_date,
            self.expected_return_date,
            Some(actual_return_date),
        )
    }
}

/// Validated input of the borrow transition
#[derive(Debug, Clone, PartialEq)]
pub struct NewBorrowing {
    pub borrow_date: NaiveDate,
    pub expected_return_date: NaiveDate,
    pub book_id: i32,
}

impl NewBorrowing {
    /// Checks run against the locked book row, in order: availability, then dates
    pub fn check_against(&self, book: &Book) -> AppResult<()> {
        if !book.is_available() {
            return Err(AppError::BookUnavailable(
                "Such book is not available in the library".to_string(),
            ));
        }
        validate_dates(self.borrow_date, self.expected_return_date, None)
    }
}

/// Create borrowing request. The borrower is always the caller; any
/// `user` or `actual_return_date` in the body is ignored.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CreateBorrowing {
    /// Defaults to today
    pub borrow_date: Option<NaiveDate>,
    pub expected_return_date: Option<NaiveDate>,
    /// Book ID
    pub book: Option<i32>,
}

impl CreateBorrowing {
    pub fn into_new_borrowing(self, today: NaiveDate) -> AppResult<NewBorrowing> {
        let mut missing = FieldErrors::new();
        if self.expected_return_date.is_none() {
            missing.insert("expected_return_date".to_string(), vec![REQUIRED.to_string()]);
        }
        if self.book.is_none() {
            missing.insert("book".to_string(), vec![REQUIRED.to_string()]);
        }

        match (self.expected_return_date, self.book) {
            (Some(expected_return_date), Some(book_id)) => Ok(NewBorrowing {
                borrow_date: self.borrow_date.unwrap_or(today),
                expected_return_date,
                book_id,
            }),
            _ => Err(AppError::Validation(missing)),
        }
    }
}

/// Return borrowing request
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ReturnBorrowing {
    pub actual_return_date: Option<NaiveDate>,
}

impl ReturnBorrowing {
    pub fn required_date(&self) -> AppResult<NaiveDate> {
        self.actual_return_date
            .ok_or_else(|| AppError::field("actual_return_date", REQUIRED))
    }
}

/// Borrowing with the book expanded and the borrower as display string
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BorrowingDetails {
    pub id: i32,
    pub borrow_date: NaiveDate,
    pub expected_return_date: NaiveDate,
    pub actual_return_date: Option<NaiveDate>,
    pub book: Book,
    /// Borrower email
    pub user: String,
    #[serde(skip)]
    pub user_id: i32,
}

impl std::fmt::Display for BorrowingDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} borrowed {} {}", self.user, self.book, self.borrow_date)
    }
}

/// Flat row for borrowing queries joined with books and users
#[derive(Debug, Clone, FromRow)]
pub struct BorrowingRow {
    id: i32,
    borrow_date: NaiveDate,
    expected_return_date: NaiveDate,
    actual_return_date: Option<NaiveDate>,
    user_id: i32,
    user_email: String,
    book_id: i32,
    book_title: String,
    book_author: String,
    book_cover: Cover,
    book_inventory: i32,
    book_daily_fee: Decimal,
}

impl From<BorrowingRow> for BorrowingDetails {
    fn from(row: BorrowingRow) -> Self {
        BorrowingDetails {
            id: row.id,
            borrow_date: row.borrow_date,
            expected_return_date: row.expected_return_date,
            actual_return_date: row.actual_return_date,
            book: Book {
                id: row.book_id,
                title: row.book_title,
                author: row.book_author,
                cover: row.book_cover,
                inventory: row.book_inventory,
                daily_fee: row.book_daily_fee,
            },
            user: row.user_email,
            user_id: row.user_id,
        }
    }
}

/// Borrowing list query parameters
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct BorrowingQuery {
    /// "active" or "returned"; other values are ignored
    pub is_active: Option<String>,
    /// Borrower ID, honored for staff only
    pub user_id: Option<String>,
}

/// Effective filter after applying the caller's visibility scope
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BorrowingFilter {
    pub user_id: Option<i32>,
    pub status: Option<BorrowingStatus>,
}

impl BorrowingFilter {
    /// Resolve what `caller` may list given the requested filters.
    ///
    /// Non-staff callers are always pinned to their own borrowings and their
    /// `user_id` parameter is dropped unparsed. Staff see everything unless
    /// they ask for a specific borrower.
    pub fn resolve(caller: &UserClaims, query: &BorrowingQuery) -> AppResult<Self> {
        let status = match query.is_active.as_deref() {
            Some("active") => Some(BorrowingStatus::Open),
            Some("returned") => Some(BorrowingStatus::Closed),
            _ => None,
        };

        let user_id = if caller.is_staff {
            match query.user_id.as_deref() {
                Some(raw) => Some(
                    raw.trim()
                        .parse::<i32>()
                        .map_err(|_| AppError::field("user_id", "A valid integer is required."))?,
                ),
                None => None,
            }
        } else {
            Some(caller.user_id)
        };

        Ok(Self { user_id, status })
    }
}

/// Whether `caller` may see or act on a borrowing owned by `owner_id`
pub fn can_access(caller: &UserClaims, owner_id: i32) -> bool {
    caller.is_staff || caller.user_id == owner_id
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn caller(user_id: i32, is_staff: bool) -> UserClaims {
        UserClaims {
            sub: format!("user{}@mail.com", user_id),
            user_id,
            is_staff,
            exp: 0,
            iat: 0,
        }
    }

    fn book(inventory: i32) -> Book {
        Book {
            id: 1,
            title: "Kobzar".to_string(),
            author: "Taras Shevchenko".to_string(),
            cover: Cover::Hard,
            inventory,
            daily_fee: Decimal::new(200, 2),
        }
    }

    fn borrowing(actual_return_date: Option<&str>) -> Borrowing {
        Borrowing {
            id: 1,
            borrow_date: date("2023-01-03"),
            expected_return_date: date("2023-01-08"),
            actual_return_date: actual_return_date.map(date),
            book_id: 1,
            user_id: 1,
        }
    }

    fn query(is_active: Option<&str>, user_id: Option<&str>) -> BorrowingQuery {
        BorrowingQuery {
            is_active: is_active.map(String::from),
            user_id: user_id.map(String::from),
        }
    }

    #[test]
    fn test_validate_dates() {
        assert!(validate_dates(date("2023-01-03"), date("2023-01-08"), None).is_ok());
        assert!(validate_dates(date("2023-01-03"), date("2023-01-03"), Some(date("2023-01-03"))).is_ok());

        assert!(matches!(
            validate_dates(date("2023-01-10"), date("2023-01-08"), None),
            Err(AppError::InvalidDateRange { field: "expected_return_date", .. })
        ));
        assert!(matches!(
            validate_dates(date("2023-01-05"), date("2023-01-08"), Some(date("2023-01-04"))),
            Err(AppError::InvalidDateRange { field: "actual_return_date", .. })
        ));
    }

    #[test]
    fn test_borrow_checks_availability_before_dates() {
        let new = NewBorrowing {
            borrow_date: date("2023-01-10"),
            expected_return_date: date("2023-01-08"),
            book_id: 1,
        };

        assert!(matches!(new.check_against(&book(0)), Err(AppError::BookUnavailable(_))));
        assert!(matches!(
            new.check_against(&book(1)),
            Err(AppError::InvalidDateRange { .. })
        ));
    }

    #[test]
    fn test_borrow_allowed_with_stock_and_ordered_dates() {
        let new = NewBorrowing {
            borrow_date: date("2023-01-03"),
            expected_return_date: date("2023-01-08"),
            book_id: 1,
        };
        assert!(new.check_against(&book(1)).is_ok());
    }

    #[test]
    fn test_create_request_defaults_borrow_date() {
        let request = CreateBorrowing {
            borrow_date: None,
            expected_return_date: Some(date("2023-01-08")),
            book: Some(3),
        };

        let new = request.into_new_borrowing(date("2023-01-03")).unwrap();
        assert_eq!(new.borrow_date, date("2023-01-03"));
        assert_eq!(new.book_id, 3);
    }

    #[test]
    fn test_create_request_reports_all_missing_fields() {
        let err = CreateBorrowing::default()
            .into_new_borrowing(date("2023-01-03"))
            .unwrap_err();

        match err {
            AppError::Validation(fields) => {
                assert_eq!(fields["expected_return_date"], vec![REQUIRED.to_string()]);
                assert_eq!(fields["book"], vec![REQUIRED.to_string()]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_create_request_ignores_client_user_and_return_date() {
        let request: CreateBorrowing = serde_json::from_str(
            r#"{"expected_return_date": "2023-01-08", "book": 1,
                "user": 42, "actual_return_date": "2023-01-08"}"#,
        )
        .unwrap();
        assert_eq!(request.book, Some(1));
    }

    #[test]
    fn test_return_rejects_second_return() {
        let closed = borrowing(Some("2023-01-08"));
        assert_eq!(closed.status(), BorrowingStatus::Closed);
        assert!(matches!(
            closed.check_return(date("2023-01-09")),
            Err(AppError::AlreadyReturned(_))
        ));
    }

    #[test]
    fn test_already_returned_wins_over_bad_date() {
        let closed = borrowing(Some("2023-01-08"));
        assert!(matches!(
            closed.check_return(date("2022-12-31")),
            Err(AppError::AlreadyReturned(_))
        ));
    }

    #[test]
    fn test_return_date_must_not_precede_borrow_date() {
        let open = borrowing(None);
        assert_eq!(open.status(), BorrowingStatus::Open);
        assert!(matches!(
            open.check_return(date("2023-01-02")),
            Err(AppError::InvalidDateRange { field: "actual_return_date", .. })
        ));
        // Late returns are fine
        assert!(open.check_return(date("2023-01-09")).is_ok());
    }

    #[test]
    fn test_return_request_requires_date() {
        assert!(matches!(
            ReturnBorrowing::default().required_date(),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_non_staff_scope_ignores_user_id() {
        let filter = BorrowingFilter::resolve(&caller(5, false), &query(None, Some("9"))).unwrap();
        assert_eq!(filter.user_id, Some(5));

        // Malformed values are ignored rather than rejected
        let filter = BorrowingFilter::resolve(&caller(5, false), &query(None, Some("abc"))).unwrap();
        assert_eq!(filter.user_id, Some(5));
    }

    #[test]
    fn test_staff_scope() {
        let all = BorrowingFilter::resolve(&caller(1, true), &query(None, None)).unwrap();
        assert_eq!(all, BorrowingFilter::default());

        let one = BorrowingFilter::resolve(&caller(1, true), &query(None, Some("9"))).unwrap();
        assert_eq!(one.user_id, Some(9));

        assert!(matches!(
            BorrowingFilter::resolve(&caller(1, true), &query(None, Some("abc"))),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_is_active_values() {
        let staff = caller(1, true);
        let status = |value: Option<&str>| {
            BorrowingFilter::resolve(&staff, &query(value, None))
                .unwrap()
                .status
        };

        assert_eq!(status(Some("active")), Some(BorrowingStatus::Open));
        assert_eq!(status(Some("returned")), Some(BorrowingStatus::Closed));
        assert_eq!(status(Some("yes")), None);
        assert_eq!(status(None), None);
    }

    #[test]
    fn test_filters_compose() {
        let filter =
            BorrowingFilter::resolve(&caller(5, false), &query(Some("returned"), Some("9"))).unwrap();
        assert_eq!(
            filter,
            BorrowingFilter {
                user_id: Some(5),
                status: Some(BorrowingStatus::Closed),
            }
        );
    }

    #[test]
    fn test_can_access() {
        assert!(can_access(&caller(5, false), 5));
        assert!(!can_access(&caller(5, false), 6));
        assert!(can_access(&caller(1, true), 6));
    }

    #[test]
    fn test_details_display_and_json() {
        let details = BorrowingDetails {
            id: 1,
            borrow_date: date("2023-01-03"),
            expected_return_date: date("2023-01-08"),
            actual_return_date: None,
            book: book(2),
            user: "bob@mail.com".to_string(),
            user_id: 4,
        };

        assert_eq!(details.to_string(), "bob@mail.com borrowed Kobzar 2023-01-03");

        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["user"], "bob@mail.com");
        assert_eq!(json["book"]["title"], "Kobzar");
        assert_eq!(json["borrow_date"], "2023-01-03");
        assert!(json["actual_return_date"].is_null());
        assert!(json.get("user_id").is_none());
    }
}
