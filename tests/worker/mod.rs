mod tests_worker;
