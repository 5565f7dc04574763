mod project_store;
mod task_store;
