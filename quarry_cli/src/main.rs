//! Binary-tree stress sample.
//!
//! Keeps a forest of labeled binary trees alive while rebuilding each
//! tree at ever greater heights, validating the previous generation
//! before replacing it and giving the collector a chance to reclaim it
//! afterwards. Collection runs only at the explicit `allow_collect`
//! points, so plain `GcRef`s are safe to hold inside each rebuild.

mod args;

use std::time::Instant;

use slog::{o, Drain, Logger};

use quarry_gc::{
    alloc, CopyingCollector, GcArray, GcConfig, GcRef, GcStr, Rooted, Trace, Tracer,
};

struct Tree {
    label: GcRef<GcStr>,
    left: GcRef<Tree>,
    right: GcRef<Tree>,
}

unsafe impl Trace for Tree {
    fn trace(&mut self, tracer: &mut dyn Tracer) {
        self.label.trace(tracer);
        self.left.trace(tracer);
        self.right.trace(tracer);
    }
}

impl Tree {
    /// Build a complete tree of `height` levels with pre-order labels
    /// "Node 1", "Node 2", ...
    fn build(height: usize) -> GcRef<Tree> {
        let mut counter = 0;
        Self::build_at(&mut counter, 0, height)
    }

    fn build_at(counter: &mut usize, level: usize, height: usize) -> GcRef<Tree> {
        if level >= height {
            return GcRef::null();
        }
        *counter += 1;
        let label = *counter;
        let mut root = Rooted::new(alloc(Tree {
            label: GcRef::null(),
            left: GcRef::null(),
            right: GcRef::null(),
        }));
        root.label = GcStr::new(&format!("Node {label}"));
        root.left = Self::build_at(counter, level + 1, height);
        root.right = Self::build_at(counter, level + 1, height);
        *root
    }

    /// Validate a tree built by [`Tree::build`] with `height` levels.
    fn check(tree: GcRef<Tree>, height: usize) -> bool {
        let mut counter = 0;
        if height == 0 {
            tree.is_null()
        } else {
            Self::check_at(tree, &mut counter, 0, height)
        }
    }

    fn check_at(tree: GcRef<Tree>, counter: &mut usize, level: usize, height: usize) -> bool {
        if tree.is_null() {
            return false;
        }
        *counter += 1;
        if *tree.label != *format!("Node {counter}") {
            return false;
        }
        if level + 1 < height {
            Self::check_at(tree.left, counter, level + 1, height)
                && Self::check_at(tree.right, counter, level + 1, height)
        } else {
            tree.left.is_null() && tree.right.is_null()
        }
    }
}

type Wood = GcArray<GcRef<Tree>>;

fn main() {
    let parsed = match args::parse(std::env::args().skip(1)) {
        Ok(args::Parsed::Run(args)) => args,
        Ok(args::Parsed::Help) => {
            print!("{}", args::USAGE);
            return;
        }
        Err(message) => {
            eprintln!("{message}");
            std::process::exit(2);
        }
    };

    let logger = if parsed.verbose {
        let plain = slog_term::PlainSyncDecorator::new(std::io::stdout());
        Logger::root(
            slog_term::FullFormat::new(plain).build().fuse(),
            o!("sample" => "trees"),
        )
    } else {
        Logger::root(slog::Discard, o!())
    };

    let start = Instant::now();
    {
        let gc = CopyingCollector::with_logger(
            GcConfig {
                segment_size: 8 * 1024 * 1024,
                trigger_threshold: 1024 * 1024,
                ..Default::default()
            },
            logger,
        );

        let mut wood: Rooted<GcRef<Wood>> = Rooted::new(GcArray::new(parsed.trees));
        for height in 1..parsed.max_height {
            for tree in 0..parsed.trees {
                if !Tree::check(wood[tree], height - 1) {
                    eprintln!("check failed for height={} tree={}", height, tree);
                    std::process::exit(1);
                }
                wood[tree] = Tree::build(height);
            }
            gc.allow_collect();
        }
    }
    println!("Elapsed time {}", start.elapsed().as_secs());
}
