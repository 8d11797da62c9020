use kvshrink_store::{Container, ContainerPath, StoreResult, Transaction};

/// Find the container at `path` inside `tx`.
///
/// Resolution starts at the root container named by the first segment and
/// descends one child per remaining segment. With `create_if_missing` every
/// missing segment is created as an empty container, which needs a write
/// transaction; nothing created here is undone except by the transaction's own
/// rollback. Without it a missing segment yields `Ok(None)`.
pub fn resolve<'t, T: Transaction>(
    tx: &'t T,
    path: &ContainerPath,
    create_if_missing: bool,
) -> StoreResult<Option<T::Container<'t>>> {
    let (first, rest) = match path.segments().split_first() {
        Some(split) => split,
        None => return Ok(None),
    };

    let mut container = if create_if_missing {
        tx.create_root_if_missing(first)?
    } else {
        match tx.root(first)? {
            Some(root) => root,
            None => return Ok(None),
        }
    };

    for segment in rest {
        container = if create_if_missing {
            container.create_child_if_missing(segment)?
        } else {
            match container.child(segment)? {
                Some(child) => child,
                None => return Ok(None),
            }
        };
    }
    Ok(Some(container))
}
