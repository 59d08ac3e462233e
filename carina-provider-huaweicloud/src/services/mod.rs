//! Service adapters, one module per HuaweiCloud service

pub mod ccm;
pub mod cloudtable;
pub mod ddm;
pub mod ims;
pub mod mrs;
