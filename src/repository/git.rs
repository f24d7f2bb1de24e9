//! Git command lines used by the repository controller.

/// The git executable.
pub const GIT: &str = "git";

/// The remote every clone tracks.
pub const REMOTE: &str = "origin";

/// Marker directory of an existing working copy.
pub const GIT_DIR: &str = ".git";

/// Relationship between the local and remote commits, from
/// `git merge-base --is-ancestor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ancestry {
    /// Local is an ancestor of remote: a fast-forward is possible.
    Behind,
    /// Local has diverged from, or is ahead of, remote.
    NotAncestor,
}

impl Ancestry {
    /// Maps an `--is-ancestor` exit code; other codes are real errors.
    pub fn from_exit_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Ancestry::Behind),
            1 => Some(Ancestry::NotAncestor),
            _ => None,
        }
    }
}

fn owned(args: &[&str]) -> Vec<String> {
    args.iter().map(|arg| arg.to_string()).collect()
}

/// `clone -b <branch> <url> <dir>`, run inside the base directory.
pub fn clone_args(branch: &str, url: &str, dir: &str) -> Vec<String> {
    owned(&["clone", "-b", branch, url, dir])
}

/// `fetch origin <branch> --prune`
pub fn fetch_args(branch: &str) -> Vec<String> {
    owned(&["fetch", REMOTE, branch, "--prune"])
}

/// `rev-parse <rev>`
pub fn rev_parse_args(rev: &str) -> Vec<String> {
    owned(&["rev-parse", rev])
}

/// Remote-tracking ref for `branch`, e.g. `origin/main`.
pub fn remote_ref(branch: &str) -> String {
    format!("{}/{}", REMOTE, branch)
}

/// `merge-base --is-ancestor <local> <remote>`
pub fn is_ancestor_args(local: &str, remote: &str) -> Vec<String> {
    owned(&["merge-base", "--is-ancestor", local, remote])
}

/// `pull origin <branch> --ff-only`
pub fn pull_args(branch: &str) -> Vec<String> {
    owned(&["pull", REMOTE, branch, "--ff-only"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_targets_branch_and_directory() {
        assert_eq!(
            clone_args("main", "https://example.com/a.git", "a"),
            vec!["clone", "-b", "main", "https://example.com/a.git", "a"]
        );
    }

    #[test]
    fn fetch_and_pull_stay_on_origin() {
        assert_eq!(fetch_args("dev"), vec!["fetch", "origin", "dev", "--prune"]);
        assert_eq!(pull_args("dev"), vec!["pull", "origin", "dev", "--ff-only"]);
        assert_eq!(remote_ref("dev"), "origin/dev");
    }

    #[test]
    fn ancestry_only_understands_zero_and_one() {
        assert_eq!(Ancestry::from_exit_code(0), Some(Ancestry::Behind));
        assert_eq!(Ancestry::from_exit_code(1), Some(Ancestry::NotAncestor));
        assert_eq!(Ancestry::from_exit_code(128), None);
        assert_eq!(Ancestry::from_exit_code(-1), None);
    }
}
