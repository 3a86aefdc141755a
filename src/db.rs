pub mod commission_repo;
pub use commission_repo::CommissionRepository;
pub mod holiday_repo;
pub use holiday_repo::HolidayRepository;
pub mod package_repo;
pub use package_repo::PackageRepository;
pub mod policy_repo;
pub use policy_repo::PolicyRepository;
pub mod sale_repo;
pub use sale_repo::SaleRepository;
