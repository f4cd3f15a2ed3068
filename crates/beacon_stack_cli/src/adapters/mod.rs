pub mod caller_account;
pub mod function_names;
