/// Run `attempt` against each candidate in preference order and return the
/// first candidate that yields a value, together with that value.
///
/// Both fallback chains in the pipeline are instances of this pattern: the
/// background provider walking its known request paths, and the capture
/// pipeline walking its codec candidates. A `None` from `attempt` means
/// "this candidate did not work, try the next one"; exhausting the list
/// returns `None` and the caller decides whether that is fatal.
pub async fn first_success<C, T, F>(candidates: &[C], mut attempt: F) -> Option<(C, T)>
where
    C: Clone,
    F: AsyncFnMut(C) -> Option<T>,
{
    for candidate in candidates {
        if let Some(value) = attempt(candidate.clone()).await {
            return Some((candidate.clone(), value));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_first_winning_candidate() {
        let candidates = vec!["a", "b", "c"];
        let mut tried = Vec::new();
        let won = first_success(&candidates, async |c| {
            tried.push(c);
            (c == "b").then_some(42)
        })
        .await;

        assert_eq!(won, Some(("b", 42)));
        assert_eq!(tried, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn exhausts_candidates_in_order() {
        let candidates = vec![1, 2, 3];
        let mut tried = Vec::new();
        let won: Option<(i32, ())> = first_success(&candidates, async |c| {
            tried.push(c);
            None
        })
        .await;

        assert!(won.is_none());
        assert_eq!(tried, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn empty_candidate_list_yields_none() {
        let candidates: Vec<u8> = Vec::new();
        let won: Option<(u8, u8)> = first_success(&candidates, async |_| Some(0)).await;
        assert!(won.is_none());
    }
}
