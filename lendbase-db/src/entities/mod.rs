//! The back-office entity set: one module per kind, each carrying its
//! descriptor, row mapping and typed patch.

pub mod base_info;
pub mod disbursement;
pub mod payout_channel;
pub mod risk_customer;
pub mod user;

pub use base_info::{LoanBaseInfo, LoanBaseInfoPatch};
pub use disbursement::{Disbursement, DisbursementOverviewRow, DisbursementPatch};
pub use payout_channel::{PayoutChannel, PayoutChannelPatch};
pub use risk_customer::{RiskCustomer, RiskCustomerExpanded, RiskCustomerPatch};
pub use user::{User, UserBrief, UserPatch, UserRoleRow};
