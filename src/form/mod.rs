pub mod binder;
pub mod classifier;
pub mod context;
pub mod options;
pub mod select;
pub mod submit;

pub use binder::{Binder, BoundForm, ControlFingerprint};
pub use classifier::{
    AttributeStrategy, Classification, ClassifyStrategy, ControlClassifier, LabelStrategy,
    SignatureStrategy,
};
pub use context::ContextLocator;
pub use options::OptionSet;
pub use select::CascadingSelector;
pub use submit::SearchTrigger;
