pub mod board_view;
pub mod theme;
pub mod toolbar;
