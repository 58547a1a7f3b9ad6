mod tests_build;
mod tests_rebuild;
