fn main() -> anyhow::Result<()> {
    rubric_ledger::run()?;
    Ok(())
}
