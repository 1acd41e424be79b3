//! Maintenance subcommands that work on the checkpoint files without
//! touching the directory.

use anyhow::{Context, Result};

use crate::checkpoint::{CheckpointStore, WorkList, CLEAN_NAME_1_COLUMN, CLEAN_NAME_2_COLUMN};
use crate::config::AppConfig;
use crate::org_normalizer::candidate_names;

/// Fill missing clean-name columns from the raw employer names.
/// Returns the number of cases that gained at least one name.
pub fn prepare_work_list(work_list: &mut WorkList, max_chars: usize) -> usize {
    work_list.ensure_column(CLEAN_NAME_1_COLUMN);
    work_list.ensure_column(CLEAN_NAME_2_COLUMN);

    let mut updated = 0;
    for case in work_list.cases.iter_mut() {
        if case.clean_name_1.is_some() && case.clean_name_2.is_some() {
            continue;
        }

        let names = candidate_names(
            &case.employer_name,
            case.clean_name_1.as_deref(),
            case.clean_name_2.as_deref(),
            max_chars,
        );

        let mut changed = false;
        if case.clean_name_1.is_none() && !names.primary.is_empty() {
            case.clean_name_1 = Some(names.primary);
            changed = true;
        }
        if case.clean_name_2.is_none() {
            if let Some(secondary) = names.secondary {
                case.clean_name_2 = Some(secondary);
                changed = true;
            }
        }
        if changed {
            updated += 1;
        }
    }
    updated
}

/// `prepare` subcommand
pub fn run_prepare(config: &AppConfig) -> Result<()> {
    let store = CheckpointStore::from_config(&config.paths);
    let mut work_list = store.load_work_list()?;

    let updated = prepare_work_list(&mut work_list, config.names.max_search_chars);
    store
        .save_work_list(&work_list)
        .with_context(|| format!("Failed to rewrite {}", store.work_list_path().display()))?;

    println!(
        "Prepared {} of {} cases in {}",
        updated,
        work_list.len(),
        store.work_list_path().display()
    );
    Ok(())
}

/// `status` subcommand
pub fn show_status(config: &AppConfig) -> Result<()> {
    let store = CheckpointStore::from_config(&config.paths);
    let state = store.load()?;
    let manifest = store.load_manifest()?;

    println!("Work list: {}", store.work_list_path().display());
    println!("{}", "=".repeat(60));
    println!("{}", state.summary(manifest.as_ref()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::Case;

    #[test]
    fn test_prepare_fills_missing_names() {
        let mut work_list = WorkList {
            headers: vec![
                "case_number".to_string(),
                "company_name".to_string(),
                "emp_1_city".to_string(),
                "emp_1_state".to_string(),
                "scrape_status".to_string(),
            ],
            cases: vec![
                Case::new("01-RC-1", "Foo Bar LLC d/b/a Baz Industries, Inc.", "Springfield", "IL"),
                Case::new("01-RC-2", "Acme Foods, Inc.", "Springfield", "IL"),
            ],
        };

        let updated = prepare_work_list(&mut work_list, 30);

        assert_eq!(updated, 2);
        assert!(work_list.has_column("clean_name_1"));
        assert!(work_list.has_column("clean_name_2"));
        assert_eq!(work_list.cases[0].clean_name_1.as_deref(), Some("Baz Industries"));
        assert_eq!(work_list.cases[0].clean_name_2.as_deref(), Some("Foo Bar"));
        assert_eq!(work_list.cases[1].clean_name_1.as_deref(), Some("Acme Foods"));
        assert_eq!(work_list.cases[1].clean_name_2, None);
    }

    #[test]
    fn test_prepare_keeps_existing_names() {
        let case = Case::new("01-RC-1", "Acme Foods, Inc.", "Springfield", "IL")
            .with_clean_names(Some("Acme"), None);
        let mut work_list = WorkList::new(vec![case]);

        let updated = prepare_work_list(&mut work_list, 30);

        assert_eq!(updated, 0);
        assert_eq!(work_list.cases[0].clean_name_1.as_deref(), Some("Acme"));
    }
}
