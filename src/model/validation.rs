//! Duplicate-name checks for the UI layer.
//!
//! The mutation coordinator does not enforce name uniqueness; forms call
//! these against the cached collections before submitting.

use super::{EntityId, List, Task};

/// Case-insensitive match against every other list.
pub fn is_duplicate_list_name(lists: &[List], name: &str, except: Option<EntityId>) -> bool {
    let wanted = name.trim().to_lowercase();
    lists
        .iter()
        .filter(|list| Some(list.id) != except)
        .any(|list| list.name.trim().to_lowercase() == wanted)
}

/// Case-insensitive match against the other tasks of the same list.
pub fn is_duplicate_task_name(
    tasks: &[Task],
    list_id: i64,
    name: &str,
    except: Option<EntityId>,
) -> bool {
    let wanted = name.trim().to_lowercase();
    tasks
        .iter()
        .filter(|task| task.list_id == list_id && Some(task.id) != except)
        .any(|task| task.name.trim().to_lowercase() == wanted)
}
