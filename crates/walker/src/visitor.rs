//! Visitor-driven tree walks

use crate::engine::TraversalEngine;
use crate::event::TraversalEvent;
use crate::options::WalkOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use treewatch_core::error::{Error, Result};
use treewatch_core::fs::FileSystem;
use treewatch_core::FileAttributes;

/// What the walk should do after a visitor callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisitResult {
    Continue,
    /// Do not descend into the directory just announced
    SkipSubtree,
    /// Skip the remaining entries of the current directory
    SkipSiblings,
    Terminate,
}

/// Callbacks for [`walk_file_tree`]
///
/// The defaults continue the walk and turn any reported error into a failure
/// of the whole walk.
pub trait FileVisitor {
    fn pre_visit_directory(&mut self, _dir: &Path, _attrs: &FileAttributes) -> Result<VisitResult> {
        Ok(VisitResult::Continue)
    }

    fn visit_file(&mut self, _file: &Path, _attrs: &FileAttributes) -> Result<VisitResult> {
        Ok(VisitResult::Continue)
    }

    fn visit_file_failed(&mut self, _file: &Path, error: Error) -> Result<VisitResult> {
        Err(error)
    }

    fn post_visit_directory(&mut self, _dir: &Path, error: Option<Error>) -> Result<VisitResult> {
        match error {
            Some(e) => Err(e),
            None => Ok(VisitResult::Continue),
        }
    }
}

/// Walk the tree at `start`, calling `visitor` for every path
///
/// Returns `start` once the walk completes or is terminated. An error
/// returned by the visitor ends the walk and is passed through.
pub fn walk_file_tree<V>(
    fs: Arc<dyn FileSystem>,
    start: &Path,
    options: WalkOptions,
    visitor: &mut V,
) -> Result<PathBuf>
where
    V: FileVisitor + ?Sized,
{
    let mut engine = TraversalEngine::new(fs, options);
    let mut event = Some(engine.walk(start)?);

    while let Some(ev) = event {
        let result = match ev {
            TraversalEvent::Entry {
                path,
                result: Ok(attrs),
            } => visitor.visit_file(&path, &attrs)?,
            TraversalEvent::Entry {
                path,
                result: Err(e),
            } => visitor.visit_file_failed(&path, e)?,
            TraversalEvent::StartDirectory { path, attrs } => {
                let result = visitor.pre_visit_directory(&path, &attrs)?;
                // no further events for this directory
                if matches!(result, VisitResult::SkipSubtree | VisitResult::SkipSiblings) {
                    engine.pop();
                }
                result
            }
            TraversalEvent::EndDirectory { path, error } => {
                match visitor.post_visit_directory(&path, error)? {
                    // already leaving the directory
                    VisitResult::SkipSiblings => VisitResult::Continue,
                    other => other,
                }
            }
        };

        match result {
            VisitResult::Continue | VisitResult::SkipSubtree => {}
            VisitResult::SkipSiblings => engine.skip_remaining_siblings(),
            VisitResult::Terminate => {
                debug!("Walk of {:?} terminated by visitor", start);
                break;
            }
        }

        event = engine.next_event()?;
    }

    engine.close();
    Ok(start.to_path_buf())
}
