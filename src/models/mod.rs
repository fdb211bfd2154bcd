pub mod expense;
pub mod role;
pub mod todo;
pub mod token;
pub mod user;

pub use expense::{
    Attachment, AttachmentSummary, Category, Expense, ExpenseRow, STATUS_APPROVED, STATUS_PENDING,
    STATUS_REJECTED,
};
pub use role::{Role, RoleRecord, REPORTING_ROLES, REVIEWER_ROLES};
pub use todo::Todo;
pub use token::{is_expired, PasswordResetToken, UploadToken};
pub use user::{RoleSummary, User, UserResponse};
