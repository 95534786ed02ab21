//! Property tests for path normalization and approval keys

use proptest::prelude::*;
use serde_json::json;
use tools::{approval_key_for_call, normalize_path, ApprovalKey};

fn segment() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,8}".prop_map(String::from)
}

fn path_with_noise() -> impl Strategy<Value = (Vec<String>, String)> {
    // A clean path plus a noisy spelling of the same path built by
    // interleaving `dir/..` and `.` segments.
    prop::collection::vec(segment(), 1..5).prop_flat_map(|segments| {
        let clean = segments.clone();
        prop::collection::vec(any::<bool>(), segments.len()).prop_map(move |noise| {
            let mut parts = Vec::new();
            for (segment, noisy) in clean.iter().zip(noise.iter()) {
                if *noisy {
                    parts.push("detour".to_string());
                    parts.push("..".to_string());
                    parts.push(".".to_string());
                }
                parts.push(segment.clone());
            }
            (clean.clone(), format!("/{}", parts.join("/")))
        })
    })
}

proptest! {
    #[test]
    fn normalization_is_idempotent((_clean, noisy) in path_with_noise()) {
        let once = normalize_path(&noisy, "/");
        let twice = normalize_path(&once, "/");
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn noisy_spellings_normalize_to_the_clean_path((clean, noisy) in path_with_noise()) {
        let expected = format!("/{}", clean.join("/"));
        prop_assert_eq!(normalize_path(&noisy, "/"), expected);
    }

    #[test]
    fn equivalent_cwds_produce_equal_keys((_clean, noisy) in path_with_noise()) {
        let canonical = normalize_path(&noisy, "/");
        let from_noisy = approval_key_for_call("shell", &json!({"cwd": noisy}), "/");
        let from_clean = approval_key_for_call("shell", &json!({"cwd": canonical.clone()}), "/");
        prop_assert_eq!(from_noisy.clone(), from_clean);
        let expected_key = format!("shell:{canonical}");
        prop_assert_eq!(from_noisy.as_str(), expected_key.as_str());
    }

    #[test]
    fn distinct_directories_produce_distinct_keys(a in segment(), b in segment()) {
        prop_assume!(a != b);
        let key_a = ApprovalKey::new("shell", &format!("/{a}"));
        let key_b = ApprovalKey::new("shell", &format!("/{b}"));
        prop_assert_ne!(key_a, key_b);
    }

    #[test]
    fn tool_name_is_part_of_the_key(dir in segment()) {
        let shell = ApprovalKey::new("shell", &format!("/{dir}"));
        let patch = ApprovalKey::new("apply_patch", &format!("/{dir}"));
        prop_assert_ne!(shell, patch);
    }
}
