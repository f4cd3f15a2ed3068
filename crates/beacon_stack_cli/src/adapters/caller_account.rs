pub trait CallerAccountResolver {
    fn caller_account(&self) -> Result<String, String>;
}
