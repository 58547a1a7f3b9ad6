mod tests_events;
