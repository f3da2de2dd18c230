use vergen_gitcl::{Build, Emitter, Gitcl};

// Git metadata is optional: builds from a source tarball fall back to
// "unknown" in `version.rs`.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let build = Build::builder().build_timestamp(true).build();
    let git = Gitcl::builder().branch(true).sha(true).dirty(true).build();

    Emitter::default()
        .add_instructions(&build)?
        .add_instructions(&git)?
        .emit()?;

    Ok(())
}
