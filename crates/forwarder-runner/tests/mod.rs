mod test_runner;
