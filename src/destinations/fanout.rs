use futures::future::join_all;

use crate::error::DestinationError;

/// Runs one async write against every destination concurrently and collects
/// every failure rather than stopping at the first one: a write that fails
/// against the graph destination must not suppress the vector destination's
/// write for the same batch, since the two stores are independently
/// recoverable (a later run can repair just the one that failed).
pub async fn fanout<F, Fut>(names: &[String], op: F) -> Result<(), DestinationError>
where
    F: Fn(&str) -> Fut,
    Fut: std::future::Future<Output = Result<(), DestinationError>>,
{
    let results = join_all(names.iter().map(|name| op(name))).await;
    let errors: Vec<String> = results
        .into_iter()
        .zip(names)
        .filter_map(|(result, name)| result.err().map(|e| format!("{name}: {e}")))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(DestinationError::FanOut(errors.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn collects_every_failure_not_just_the_first() {
        let names = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let result = fanout(&names, |name| async move {
            if name == "b" {
                Err(DestinationError::Other("down".into()))
            } else {
                Ok(())
            }
        })
        .await;
        let err = result.unwrap_err();
        assert!(matches!(err, DestinationError::FanOut(msg) if msg.contains('b')));
    }

    #[tokio::test]
    async fn all_succeeding_is_ok() {
        let names = vec!["a".to_string()];
        let result = fanout(&names, |_| async { Ok(()) }).await;
        assert!(result.is_ok());
    }
}
