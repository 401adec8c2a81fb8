use alloy_sol_types::sol;

sol! {
    /// On-chain item record returned by `getItem`.
    #[derive(Debug, PartialEq, Eq)]
    struct Item {
        uint256 itemId;
        uint256 tokenId;
        string title;
        uint256 price;
        string explanation;
        string imageUrl;
        string uid;
        uint256 createdAt;
        uint256 updatedAt;
        bool isPurchased;
        string category;
        address seller;
        address buyer;
        uint8 status;
    }

    #[derive(Debug, PartialEq, Eq)]
    event ItemListed(
        uint256 indexed itemId,
        uint256 indexed tokenId,
        address indexed seller,
        string title,
        uint256 price,
        string explanation,
        string imageUrl,
        string uid,
        uint256 createdAt,
        string category
    );

    #[derive(Debug, PartialEq, Eq)]
    event ItemPurchased(
        uint256 indexed itemId,
        address indexed buyer,
        uint256 price,
        uint256 timestamp,
        uint256 tokenId
    );

    #[derive(Debug, PartialEq, Eq)]
    event ItemUpdated(
        uint256 indexed itemId,
        string title,
        uint256 price,
        string explanation,
        string imageUrl,
        string category,
        uint256 updatedAt
    );

    #[derive(Debug, PartialEq, Eq)]
    event ItemCancelled(uint256 indexed itemId, address indexed seller, uint256 timestamp);

    #[derive(Debug, PartialEq, Eq)]
    event ReceiptConfirmed(
        uint256 indexed itemId,
        address indexed buyer,
        address indexed seller,
        uint256 price,
        uint256 timestamp
    );

    function getItem(uint256 _itemId) external view returns (Item memory);
}
