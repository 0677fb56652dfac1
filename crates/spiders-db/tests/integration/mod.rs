mod source_repository_tests;
mod task_repository_tests;
