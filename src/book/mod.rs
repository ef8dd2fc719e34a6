/*!
 * Book handling: container packaging, loading, paragraph extraction and
 * structure-preserving reconstruction.
 *
 * The flow through this module is: `package` extracts the archive, `loader`
 * builds the [`model::Book`] with `extract`ed paragraphs, and after
 * translation `reconstruct` rewrites each chapter's markup with the
 * translated text at the recorded structural addresses.
 */

pub mod extract;
pub mod loader;
pub mod markup;
pub mod model;
pub mod package;
pub mod reconstruct;

pub use loader::{LoadedBook, load_book};
pub use model::{Book, Chapter, Paragraph, ParagraphKind, Resource};
