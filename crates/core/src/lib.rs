pub mod cloud;
pub mod config;
pub mod diagnostics;
pub mod fields;
pub mod geometry;
pub mod location;
pub mod media;
pub mod money;
pub mod service;
pub mod validate;

pub use cloud::{AnalyzedReceipt, CloudField, LayoutLine, LayoutPage, LayoutResult, ReceiptItem};
pub use config::{BoundaryStrategy, ConfigError, Settings};
pub use diagnostics::Diagnostics;
pub use fields::{ExtractionMetadata, FieldSource, FieldValue, ReceiptFields};
pub use geometry::{BoundaryInfo, BoundaryMethod, BoundaryPolygon, CoordinateSpace, PixelRect, Point};
pub use location::{Country, FieldWeights, LocationCandidate, LocationStrategy, StoreNameMethod};
pub use media::{ImageBuffer, ImageFormat};
pub use money::Money;
pub use service::{DocumentService, LayoutService, ServiceError};
pub use validate::{ReceiptValidator, ValidationVerdict};
