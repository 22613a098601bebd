pub mod twi;

#[cfg(test)]
pub mod mock;
