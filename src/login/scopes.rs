//! Permission scope normalization

/// Profile read permission, requested on every sign-in.
pub const BASELINE_SCOPE: &str = "user.read";

/// Caller scopes in order, with the baseline scope present exactly once.
///
/// Matching is case-insensitive; the first spelling the caller used is kept.
pub fn normalize_scopes<S: AsRef<str>>(scopes: &[S]) -> Vec<String> {
    let mut seen_baseline = false;
    let mut out = Vec::with_capacity(scopes.len() + 1);
    for scope in scopes {
        let scope = scope.as_ref();
        if scope.eq_ignore_ascii_case(BASELINE_SCOPE) {
            if seen_baseline {
                continue;
            }
            seen_baseline = true;
        }
        out.push(scope.to_string());
    }
    if !seen_baseline {
        out.push(BASELINE_SCOPE.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline_count(scopes: &[String]) -> usize {
        scopes
            .iter()
            .filter(|s| s.eq_ignore_ascii_case(BASELINE_SCOPE))
            .count()
    }

    #[test]
    fn test_empty_gets_baseline() {
        let empty: [&str; 0] = [];
        assert_eq!(normalize_scopes(&empty), vec!["user.read"]);
    }

    #[test]
    fn test_baseline_appended_after_caller_scopes() {
        assert_eq!(
            normalize_scopes(&["Mail.Read", "Calendars.Read"]),
            vec!["Mail.Read", "Calendars.Read", "user.read"]
        );
    }

    #[test]
    fn test_existing_baseline_kept_in_place() {
        assert_eq!(
            normalize_scopes(&["User.Read", "Mail.Read"]),
            vec!["User.Read", "Mail.Read"]
        );
    }

    #[test]
    fn test_duplicates_in_any_case_collapse() {
        let scopes = normalize_scopes(&["USER.READ", "Mail.Read", "user.read", "User.Read"]);
        assert_eq!(scopes, vec!["USER.READ", "Mail.Read"]);
        assert_eq!(baseline_count(&scopes), 1);
    }

    #[test]
    fn test_input_is_not_modified() {
        let input = vec!["Mail.Read".to_string()];
        let _ = normalize_scopes(&input);
        assert_eq!(input, vec!["Mail.Read"]);
    }

    #[test]
    fn test_baseline_exactly_once_for_many_inputs() {
        let pool = ["user.read", "User.Read", "USER.READ", "Mail.Send", "openid"];
        // Every sequence of length <= 3 drawn from the pool.
        let mut cases: Vec<Vec<&str>> = vec![vec![]];
        let mut frontier = cases.clone();
        for _ in 0..3 {
            frontier = frontier
                .iter()
                .flat_map(|case| {
                    pool.iter().map(move |scope| {
                        let mut longer = case.clone();
                        longer.push(*scope);
                        longer
                    })
                })
                .collect();
            cases.extend(frontier.iter().cloned());
        }
        for case in cases {
            let scopes = normalize_scopes(&case);
            assert_eq!(baseline_count(&scopes), 1, "input {:?}", case);
            for other in case.iter().filter(|s| !s.eq_ignore_ascii_case(BASELINE_SCOPE)) {
                assert!(scopes.iter().any(|s| s == other), "input {:?}", case);
            }
        }
    }
}
