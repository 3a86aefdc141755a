pub mod commission;
pub mod package;
pub mod policy;
pub mod sale;

pub use commission::{Commission, CommissionStatus};
pub use package::{ClientPackage, PackageConsumption};
pub use policy::{
    CommissionPolicy, NewCommissionPolicy, PolicyAppliesTo, PolicyKind, PolicySaleType, PolicyScope,
};
pub use sale::{Sale, SaleItem, SaleRefund, SaleStatus, SaleType};
