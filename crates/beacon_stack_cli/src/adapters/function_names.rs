pub trait FunctionNameLister {
    fn list_function_names(&self) -> Result<Vec<String>, String>;
}
