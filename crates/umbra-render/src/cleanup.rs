//! Creating a group of GPU objects that must all exist or none at all.

/// Build one value per item, in order.
///
/// If any build fails, every value already built is handed to `undo` in
/// reverse creation order and the error is returned.
pub(crate) fn build_or_undo<I, T, E>(
    items: impl IntoIterator<Item = I>,
    mut build: impl FnMut(I) -> Result<T, E>,
    mut undo: impl FnMut(T),
) -> Result<Vec<T>, E> {
    let mut built = Vec::new();
    for item in items {
        match build(item) {
            Ok(value) => built.push(value),
            Err(e) => {
                while let Some(value) = built.pop() {
                    undo(value);
                }
                return Err(e);
            }
        }
    }
    Ok(built)
}

/// Log a release failure on a path that is already returning an error.
pub(crate) fn log_release<E: std::fmt::Display>(what: &str, result: Result<(), E>) {
    if let Err(e) = result {
        tracing::warn!("Failed to release {} after an earlier error: {}", what, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_values_are_kept_on_success() {
        let mut undone = Vec::new();
        let built = build_or_undo(1..=3, |i| Ok::<_, String>(i * 10), |v| undone.push(v));
        assert_eq!(built.unwrap(), vec![10, 20, 30]);
        assert!(undone.is_empty());
    }

    #[test]
    fn failure_undoes_earlier_values_in_reverse() {
        let mut attempted = Vec::new();
        let mut undone = Vec::new();
        let result = build_or_undo(
            ["draw", "depth", "shadow", "never"],
            |name| {
                attempted.push(name);
                if name == "shadow" {
                    Err(format!("{name} failed"))
                } else {
                    Ok(name)
                }
            },
            |name| undone.push(name),
        );
        assert_eq!(result.unwrap_err(), "shadow failed");
        assert_eq!(attempted, vec!["draw", "depth", "shadow"]);
        assert_eq!(undone, vec!["depth", "draw"]);
    }

    #[test]
    fn first_failure_undoes_nothing() {
        let mut undone = 0;
        let result = build_or_undo([1], |_| Err::<u32, _>("no"), |_| undone += 1);
        assert!(result.is_err());
        assert_eq!(undone, 0);
    }
}
