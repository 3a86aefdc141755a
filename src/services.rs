pub mod calendar;
pub mod commission;
pub mod policy_admin;
pub mod sale;
pub mod statement;
pub mod wallet;

pub use commission::CommissionService;
pub use policy_admin::PolicyAdminService;
pub use sale::{RefundOutcome, SaleService};
pub use statement::StatementService;
pub use wallet::WalletService;
