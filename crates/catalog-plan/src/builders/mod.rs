//! One pure builder per strategy. Each validates the window before doing
//! anything else and ends with the same fan-out tail.

mod hybrid;
mod keyword;
mod text;
mod vector;

pub use hybrid::hybrid_plan;
pub use keyword::keyword_plan;
pub use text::text_plan;
pub use vector::vector_plan;

use catalog_core::types::Window;

use crate::stage::{Projection, Stage};

/// Page + count fan-out, flattened into the `{docs, total}` envelope.
pub(crate) fn page_tail(window: Window, include_score: bool) -> Vec<Stage> {
    vec![
        Stage::FanOut {
            docs: vec![
                Stage::Project(Projection { include_score }),
                Stage::Skip(window.skip.unsigned_abs()),
                Stage::Limit(window.limit.unsigned_abs()),
            ],
        },
        Stage::Total,
    ]
}
