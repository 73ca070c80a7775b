//! Property-based tests for the training loop and data plumbing using proptest.

mod common;

use proptest::prelude::*;
use std::collections::HashSet;

use common::{LogisticRecipe, options, trainer_with};
use tempfile::TempDir;
use yews_train::checkpoint::checkpoint_path;
use yews_train::functional::load_checkpoint;
use yews_train::{DataLoader, LoaderOptions, Sampler, SubsetRandomSampler, train_val_split};

// --- Data plumbing properties ---

proptest! {
    #[test]
    fn split_partitions_all_indices(
        len in 0usize..200,
        val_len in 0usize..250,
        seed in proptest::option::of(any::<u64>()),
    ) {
        let (train, val) = train_val_split(len, val_len, seed);
        prop_assert_eq!(val.len(), val_len.min(len));
        prop_assert_eq!(train.len() + val.len(), len);

        let mut all: Vec<usize> = train.iter().chain(val.iter()).copied().collect();
        all.sort_unstable();
        prop_assert_eq!(all, (0..len).collect::<Vec<_>>());
    }

    #[test]
    fn loader_preserves_sampler_order(
        len in 1usize..120,
        batch_size in 1usize..40,
        num_workers in 0usize..6,
        epoch in 0usize..10,
        seed in any::<u64>(),
    ) {
        let dataset: Vec<usize> = (0..len).map(|i| i * 10).collect();
        let sampler = SubsetRandomSampler::new((0..len).collect(), seed);
        let loader = DataLoader::new(
            &dataset,
            &sampler,
            epoch,
            LoaderOptions::new(batch_size, num_workers),
        )
        .unwrap();
        prop_assert_eq!(loader.num_batches(), len.div_ceil(batch_size));

        let batches: Vec<Vec<usize>> = loader.collect::<Result<_, _>>().unwrap();
        prop_assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= batch_size));
        let flat: Vec<usize> = batches.into_iter().flatten().collect();
        let expected: Vec<usize> = sampler.indices(epoch).into_iter().map(|i| i * 10).collect();
        prop_assert_eq!(flat, expected);
    }
}

// --- Trainer properties ---

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn history_keeps_baseline_offset(
        runs in proptest::collection::vec(0usize..4, 1..4),
        lr in 0.05f64..2.0,
    ) {
        let tmp = TempDir::new().unwrap();
        let mut recipe = LogisticRecipe::new("logistic");
        recipe.lr = lr;
        let mut t = trainer_with(recipe, tmp.path()).unwrap();

        for epochs in runs {
            t.train(&options(epochs, false)).unwrap();
            let history = t.history();
            prop_assert_eq!(history.val_acc.len(), history.train_acc.len() + 1);
            prop_assert_eq!(history.val_loss.len(), history.train_loss.len() + 1);
            prop_assert_eq!(t.end_epoch(), epochs);
        }
    }

    #[test]
    fn best_acc_is_running_max_of_epochs(
        epochs in 0usize..5,
        lr in 0.05f64..2.0,
    ) {
        let tmp = TempDir::new().unwrap();
        let mut recipe = LogisticRecipe::new("logistic");
        recipe.lr = lr;
        let mut t = trainer_with(recipe, tmp.path()).unwrap();
        t.train(&options(epochs, true)).unwrap();

        let val_acc = &t.history().val_acc;
        let mut running = 0.0f64;
        for epoch in 0..epochs {
            let ckpt = load_checkpoint(&checkpoint_path(&t.run_dir(), epoch)).unwrap();
            let acc = val_acc[epoch + 1];
            prop_assert_eq!(ckpt.is_best(), acc > running);
            running = running.max(acc);
            prop_assert_eq!(ckpt.best_acc, running);
        }
        prop_assert_eq!(t.best_acc(), running);
        prop_assert_eq!(t.best_model().is_some(), epochs > 0 && running > 0.0);
    }

    #[test]
    fn reset_always_draws_a_new_run_name(resets in 1usize..20) {
        let tmp = TempDir::new().unwrap();
        let mut t = trainer_with(LogisticRecipe::new("logistic"), tmp.path()).unwrap();

        let mut names = HashSet::new();
        names.insert(t.run_name().to_string());
        for _ in 0..resets {
            t.reset().unwrap();
            prop_assert!(names.insert(t.run_name().to_string()));
            prop_assert!(t.history().val_acc.is_empty());
            prop_assert_eq!(t.best_acc(), 0.0);
        }
    }
}
